use std::path::PathBuf;
use std::process::ExitCode;

use ng12_core::config::AppConfig;
use ng12_core::error::AppError;
use ng12_service::{init_tracing, Ng12Service};
use serde::Serialize;
use tracing::error;

const USAGE: &str = "usage: ng12 [--config <path>] [--json-logs] <health | assess <patient_id> | chat <patient_id> <message> | history <patient_id> | clear <patient_id>>";

fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let json_logs = take_flag(&mut args, "--json-logs");
    init_tracing(json_logs);

    match run(args) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(code = %e.code, details = ?e.details, "{}", e.message);
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(mut args: Vec<String>) -> Result<String, AppError> {
    let config_path = take_option(&mut args, "--config").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    let service = Ng12Service::open(&config)?;

    let arg = |i: usize| -> Result<&str, AppError> {
        args.get(i)
            .map(String::as_str)
            .ok_or_else(|| AppError::new("USAGE", USAGE))
    };

    match arg(0)? {
        "health" => to_json(&service.health()?),
        "assess" => to_json(&service.assess(arg(1)?)?),
        "chat" => to_json(&service.chat(arg(1)?, &args[2..].join(" "))?),
        "history" => to_json(&service.history(arg(1)?)),
        "clear" => to_json(&service.clear_history(arg(1)?)?),
        _ => Err(AppError::new("USAGE", USAGE)),
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

fn take_option(args: &mut Vec<String>, name: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == name)?;
    args.remove(pos);
    if pos < args.len() {
        Some(args.remove(pos))
    } else {
        None
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AppError::new("ENCODE_FAILED", "Failed to encode response").with_details(e.to_string()))
}
