//! CLI smoke tests - run the compiled binary against a throwaway home.
//!
//! No gateway credentials or network access required.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Run paygate with `args` and an isolated HOME; returns (exit_code, stdout, stderr).
fn run_cli_with(home: &Path, envs: &[(&str, &str)], args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_paygate");
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .env("HOME", home)
        .env("RUST_LOG", "off")
        .env_remove("PAYGATE_SECURITY_ENCRYPTION_KEY")
        .env_remove("PAYGATE_PROVIDER_ASAAS_API_KEY");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let output = cmd.output().expect("failed to execute paygate binary");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

fn run_cli(args: &[&str]) -> (i32, String, String) {
    let home = TempDir::new().unwrap();
    run_cli_with(home.path(), &[], args)
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let (code, stdout, _) = run_cli(&[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("paygate"));
}

#[test]
fn cli_version_command() {
    let (code, stdout, _) = run_cli(&["version"]);
    assert_eq!(code, 0);
    assert!(stdout.starts_with("paygate "));
}

// ============================================================================
// Encryption
// ============================================================================

#[test]
fn cli_keygen_prints_hex_key() {
    let (code, stdout, _) = run_cli(&["keygen"]);
    assert_eq!(code, 0);
    let key = stdout.trim();
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn cli_encrypt_decrypt_roundtrip() {
    let home = TempDir::new().unwrap();
    let env = [("PAYGATE_SECURITY_ENCRYPTION_KEY", TEST_KEY)];

    let (code, stdout, _) = run_cli_with(home.path(), &env, &["encrypt", "123.456.789-09"]);
    assert_eq!(code, 0);
    let blob = stdout.trim().to_string();
    assert!(!blob.contains("123.456"));

    let (code, stdout, _) = run_cli_with(home.path(), &env, &["decrypt", &blob]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "123.456.789-09");
}

#[test]
fn cli_encrypt_without_key_fails() {
    let (code, _, stderr) = run_cli(&["encrypt", "secret"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("encryption key"));
}

// ============================================================================
// Sanitizer & normalizer
// ============================================================================

#[test]
fn cli_sanitize_file() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("payload.json");
    std::fs::write(
        &file,
        r#"{"creditCard":{"cardNumber":"4111111111111111","cvv":"123"},"value":10}"#,
    )
    .unwrap();

    let (code, stdout, _) = run_cli_with(home.path(), &[], &["sanitize", file.to_str().unwrap()]);
    assert_eq!(code, 0);
    assert!(!stdout.contains("4111111111111111"));
    assert!(stdout.contains("[REDACTED]"));
    assert!(stdout.contains("\"value\": 10"));
}

#[test]
fn cli_mask_card() {
    let (code, stdout, _) = run_cli(&["mask-card", "4111 1111 1111 1234"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "************1234");
}

#[test]
fn cli_normalize() {
    let (_, stdout, _) = run_cli(&["normalize", "status", "DUNNING_RECEIVED"]);
    assert_eq!(stdout.trim(), "received");
    let (_, stdout, _) = run_cli(&["normalize", "status", "SOMETHING_NEW"]);
    assert_eq!(stdout.trim(), "pending");
    let (_, stdout, _) = run_cli(&["normalize", "event", "PAYMENT_CHARGEBACK_REQUESTED"]);
    assert_eq!(stdout.trim(), "PAYMENT_REFUNDED");
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn cli_config_show_redacts_secrets() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.json");
    std::fs::write(
        &config,
        r#"{"provider":{"asaas":{"api_key":"$aact_live_secret"}},"webhook":{"access_token":"whsec"}}"#,
    )
    .unwrap();

    let (code, stdout, _) = run_cli_with(
        home.path(),
        &[],
        &["--config", config.to_str().unwrap(), "config", "show"],
    );
    assert_eq!(code, 0);
    assert!(!stdout.contains("$aact_live_secret"));
    assert!(!stdout.contains("whsec"));
    assert!(stdout.contains("[REDACTED]"));
}

#[test]
fn cli_config_check_reports_unknown_field() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.json");
    std::fs::write(&config, r#"{"queue":{"concurency":3}}"#).unwrap();

    let (code, stdout, _) = run_cli_with(
        home.path(),
        &[],
        &["--config", config.to_str().unwrap(), "config", "check"],
    );
    assert_eq!(code, 1);
    assert!(stdout.contains("did you mean 'concurrency'?"));
}

#[test]
fn cli_config_check_defaults() {
    let (code, stdout, _) = run_cli(&["config", "check"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No config file found"));
}

// ============================================================================
// Jobs
// ============================================================================

#[test]
fn cli_jobs_list_empty() {
    let (code, stdout, _) = run_cli(&["jobs", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No jobs."));
}

#[test]
fn cli_jobs_show_missing() {
    let (code, stdout, _) = run_cli(&["jobs", "show", "nope"]);
    assert_eq!(code, 1);
    assert!(stdout.contains("not found"));
}

#[test]
fn cli_jobs_purge_rejects_pending() {
    let (code, _, stderr) = run_cli(&["jobs", "purge", "--status", "pending"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("only completed or failed"));
}

// ============================================================================
// Simulate
// ============================================================================

#[test]
fn cli_simulate_received() {
    let (code, stdout, stderr) = run_cli(&["simulate", "--amount", "99.90"]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("PAYMENT_RECEIVED"));
    assert!(stdout.contains("agreement paid"));
    assert!(stdout.contains("Debt       debt_42 is paid"));
    assert!(stdout.contains("Pagamento Confirmado"));
}

#[test]
fn cli_simulate_unknown_stage() {
    let (code, _, stderr) = run_cli(&["simulate", "--until", "teleported"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown stage"));
}
