//! Encryption, sanitizer and normalizer command handlers.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::PathBuf;

use paygate::config::Config;
use paygate::providers::{map_event, map_status};
use paygate::security::{encryption, pci};

use super::NormalizeAction;

fn encryption_key(config: &Config) -> Result<&str> {
    match config.security.encryption_key.as_deref() {
        Some(key) if !key.is_empty() => Ok(key),
        _ => bail!(
            "No encryption key configured. Set security.encryption_key or \
             PAYGATE_SECURITY_ENCRYPTION_KEY (generate one with `paygate keygen`)."
        ),
    }
}

pub(crate) fn cmd_keygen() {
    println!("{}", encryption::generate_key_hex());
}

pub(crate) fn cmd_encrypt(config: &Config, text: &str) -> Result<()> {
    println!("{}", encryption::encrypt(text, encryption_key(config)?)?);
    Ok(())
}

pub(crate) fn cmd_decrypt(config: &Config, blob: &str) -> Result<()> {
    println!("{}", encryption::decrypt(blob, encryption_key(config)?)?);
    Ok(())
}

pub(crate) fn cmd_sanitize(file: Option<PathBuf>) -> Result<()> {
    let content = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    let value: serde_json::Value =
        serde_json::from_str(&content).context("Input is not valid JSON")?;
    println!("{}", serde_json::to_string_pretty(&pci::sanitize(&value))?);
    Ok(())
}

pub(crate) fn cmd_mask_card(number: &str) {
    println!("{}", pci::mask_card_number(number));
}

pub(crate) fn cmd_normalize(action: NormalizeAction) {
    match action {
        NormalizeAction::Status { value } => println!("{}", map_status(&value)),
        NormalizeAction::Event { value } => println!("{}", map_event(&value)),
    }
}
