//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod jobs;
pub mod security;
pub mod simulate;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use paygate::config::Config;

#[derive(Parser)]
#[command(name = "paygate")]
#[command(version)]
#[command(about = "Payment gateway abstraction and webhook reconciliation", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.paygate/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new 256-bit field encryption key
    Keygen,
    /// Encrypt a value with the configured key
    Encrypt {
        /// Plaintext to encrypt
        text: String,
    },
    /// Decrypt a value produced by `encrypt`
    Decrypt {
        /// Base64 blob
        blob: String,
    },
    /// Redact card data and credentials from a JSON document
    Sanitize {
        /// JSON file to read (stdin when omitted)
        file: Option<PathBuf>,
    },
    /// Mask a card number, keeping the last four digits
    MaskCard {
        /// Card number
        number: String,
    },
    /// Map a vendor status or event onto the canonical vocabulary
    Normalize {
        #[command(subcommand)]
        action: NormalizeAction,
    },
    /// Inspect and manage the job queue
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Show or validate configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run a payment through the test-mode gateway end to end
    Simulate {
        /// Agreement amount
        #[arg(long, default_value = "150.00")]
        amount: String,
        /// Stop after this event (confirmed, received, overdue, refunded)
        #[arg(long, default_value = "received")]
        until: String,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum NormalizeAction {
    /// Vendor payment status (e.g. RECEIVED_IN_CASH)
    Status { value: String },
    /// Vendor webhook event (e.g. PAYMENT_RECEIVED)
    Event { value: String },
}

#[derive(Subcommand)]
pub enum JobsAction {
    /// List jobs, oldest first
    List {
        /// Filter by status (pending, running, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one job with its payload sanitized
    Show { id: String },
    /// Re-queue a failed job
    Retry { id: String },
    /// Remove finished jobs
    Purge {
        /// Only purge this terminal status (completed, failed)
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    Show,
    /// Check configuration for errors and warnings
    Check,
}

fn load_config(path: Option<&PathBuf>) -> paygate::Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

/// Entry point for the CLI - called from main().
pub async fn run() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Fall back to defaults so `config check` can still report a broken file.
    let logging_cfg = load_config(cli.config.as_ref())
        .map(|c| c.logging)
        .unwrap_or_default();
    paygate::utils::logging::init_logging(&logging_cfg)?;

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            println!("paygate {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Keygen) => security::cmd_keygen(),
        Some(Commands::Encrypt { text }) => {
            let config = load_config(cli.config.as_ref())?;
            security::cmd_encrypt(&config, &text)?;
        }
        Some(Commands::Decrypt { blob }) => {
            let config = load_config(cli.config.as_ref())?;
            security::cmd_decrypt(&config, &blob)?;
        }
        Some(Commands::Sanitize { file }) => security::cmd_sanitize(file)?,
        Some(Commands::MaskCard { number }) => security::cmd_mask_card(&number),
        Some(Commands::Normalize { action }) => security::cmd_normalize(action),
        Some(Commands::Jobs { action }) => {
            let config = load_config(cli.config.as_ref())?;
            jobs::cmd_jobs(&config, action).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(cli.config.as_deref(), action)?;
        }
        Some(Commands::Simulate { amount, until }) => {
            simulate::cmd_simulate(&amount, &until).await?;
        }
    }

    Ok(())
}
