use ng12_core::error::AppError;

const LOCAL_PREFIX: &str = "http://127.0.0.1";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    /// Create a client for Ollama. This is strictly limited to `127.0.0.1`.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !is_local_base_url(&base_url) {
            return Err(AppError::new(
                "AI_REMOTE_NOT_ALLOWED",
                "Ollama base URL must be localhost (127.0.0.1)",
            )
            .with_details(format!("base_url={base_url}")));
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = ureq::get(&url)
            .timeout(std::time::Duration::from_millis(800))
            .call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new("AI_OLLAMA_UNHEALTHY", "Ollama health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(AppError::new(
                "AI_OLLAMA_UNREACHABLE",
                "Failed to reach Ollama on 127.0.0.1",
            )
            .with_details(e.to_string())
            .with_retryable(true)),
        }
    }
}

// Exactly `http://127.0.0.1` with an optional `:<port>` in 1..=65535 and no path.
fn is_local_base_url(base_url: &str) -> bool {
    let Some(rest) = base_url.strip_prefix(LOCAL_PREFIX) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let Some(port) = rest.strip_prefix(':') else {
        return false;
    };
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    matches!(port.parse::<u32>(), Ok(p) if (1..=65535).contains(&p))
}

/// Map a call failure onto a structured error. Transport failures (including timeouts) are
/// retryable; `timeout_code` replaces `code` when the failure was a timeout.
pub(crate) fn call_error(
    code: &str,
    timeout_code: &str,
    message: &str,
    err: ureq::Error,
) -> AppError {
    match err {
        ureq::Error::Status(status, _) => {
            AppError::new(code, message).with_details(format!("status={status}"))
        }
        ureq::Error::Transport(t) => {
            let code = if is_timeout(&t) { timeout_code } else { code };
            AppError::new(code, message)
                .with_details(t.to_string())
                .with_retryable(true)
        }
    }
}

fn is_timeout(t: &ureq::Transport) -> bool {
    use std::error::Error as _;
    t.source()
        .and_then(|s| s.downcast_ref::<std::io::Error>())
        .map(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
        .unwrap_or(false)
}
