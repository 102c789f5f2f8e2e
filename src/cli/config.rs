//! Config show/check command handlers.

use anyhow::{Context, Result};
use std::path::Path;

use paygate::config::validate::{check_values, validate_config, DiagnosticLevel};
use paygate::config::Config;

use super::ConfigAction;

pub(crate) fn cmd_config(path: Option<&Path>, action: ConfigAction) -> Result<()> {
    let default_path = Config::path();
    let config_path = path.unwrap_or(&default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_from_path(config_path)?;
            println!("{}", serde_json::to_string_pretty(&config.redacted()?)?);
        }
        ConfigAction::Check => {
            println!("Config file: {}", config_path.display());

            let mut diagnostics = Vec::new();
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .context("Failed to read config file")?;
                let raw: serde_json::Value = match serde_json::from_str(&content) {
                    Ok(v) => v,
                    Err(e) => {
                        println!("[ERROR] Invalid JSON: {}", e);
                        std::process::exit(1);
                    }
                };
                diagnostics.extend(validate_config(&raw));
            } else {
                println!("[OK] No config file found (using defaults)");
            }

            let config = Config::load_from_path(config_path)?;
            diagnostics.extend(check_values(&config));
            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Warn)
                .count();

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
            if errors > 0 {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
