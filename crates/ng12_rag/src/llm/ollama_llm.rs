use std::time::Duration;

use ng12_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::ollama::{call_error, OllamaClient};

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    model: String,
    timeout: Duration,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        // Deterministic decoding, JSON-only output.
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: 0.0,
                top_p: 1.0,
                num_predict: 512,
            },
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new(codes::REASONER_FAILED, "Failed to encode generate request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&url).timeout(self.timeout).send_json(body);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: GenerateResponse = r.into_json().map_err(|e| {
                    AppError::new(codes::REASONER_FAILED, "Failed to decode generate response")
                        .with_details(e.to_string())
                })?;
                if v.response.trim().is_empty() {
                    return Err(AppError::new(
                        codes::REASONER_FAILED,
                        "Generate response was empty",
                    ));
                }
                Ok(v.response)
            }
            Ok(r) => Err(
                AppError::new(codes::REASONER_FAILED, "Generate request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(call_error(
                codes::REASONER_FAILED,
                codes::REASONER_TIMEOUT,
                "Failed to call generate endpoint",
                e,
            )),
        }
    }
}
