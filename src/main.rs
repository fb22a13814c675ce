// src/main.rs

use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use userpool_jwt::prelude::*;

const USAGE: &str = "usage: userpool-jwt <config.yaml>";

fn load_config(path: &str) -> Result<Config, UserPoolJwtError> {
    let raw = std::fs::read_to_string(path).map_err(|source| UserPoolJwtError::ResourceUnavailable {
        path: path.to_string(),
        source,
    })?;
    let builder: ConfigBuilder = serde_yaml::from_str(&raw)
        .map_err(|e| UserPoolJwtError::ConfigurationInvalid(format!("{path}: {e}")))?;
    builder.build()
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    let validator = match load_config(&config_path).and_then(Validator::new) {
        Ok(validator) => validator,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    info!(issuer = %validator.config().issuer(), "Verifying ID token");
    let claims = match validator.acquire_and_validate().await {
        Ok(claims) => claims,
        Err(e) => {
            error!("Token verification failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&claims) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize claims: {}", e);
            ExitCode::FAILURE
        }
    }
}
