//! wsettings - withdrawal limit and validation settings for the admin backend
//!
//! # WARNING
//! - Changes apply to live withdrawals as soon as they are saved.
//! - Pausing withdrawals blocks every user of the brand until resumed.

use anyhow::Result;
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use withdrawal_settings::cli::commands::{self, SessionArgs, ThresholdsEdit};
use withdrawal_settings::config::Config;

/// Withdrawal settings - limits, thresholds and validation per brand
#[derive(Parser)]
#[command(name = "wsettings")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Brand to operate on (default: session.default_brand, else platform default)
    #[arg(short, long, global = true, env = "WSETTINGS_BRAND")]
    brand: Option<String>,

    /// Work against built-in sample data instead of the admin API
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current settings of a brand
    Show,

    /// Show current configuration (secrets masked)
    Config,

    /// Check that the admin API is reachable
    Health,

    /// Edit global withdrawal limits (amounts in major units, e.g. 25.50)
    GlobalLimits {
        #[arg(long)]
        min: Option<String>,

        #[arg(long)]
        max: Option<String>,

        /// on/off
        #[arg(long, value_parser = BoolishValueParser::new())]
        enabled: Option<bool>,
    },

    /// Edit the limits of one chain
    ChainLimits {
        /// Chain id, e.g. ethereum
        chain: String,

        #[arg(long)]
        min: Option<String>,

        #[arg(long)]
        max: Option<String>,
    },

    /// Turn per-chain validation on or off
    Validation {
        /// on/off
        #[arg(action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
        enabled: bool,
    },

    /// Pause all withdrawals
    Pause {
        /// Why withdrawals are being paused
        #[arg(long)]
        reason: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Resume withdrawals
    Resume {
        #[arg(long)]
        reason: String,
    },

    /// Edit KYC thresholds
    Thresholds {
        #[arg(long)]
        cumulative_kyc_limit: Option<String>,

        /// on/off
        #[arg(long, value_parser = BoolishValueParser::new())]
        cumulative_kyc: Option<bool>,

        #[arg(long)]
        kyc_daily_limit: Option<String>,

        /// on/off
        #[arg(long, value_parser = BoolishValueParser::new())]
        kyc_daily: Option<bool>,
    },

    /// Edit manual review thresholds
    ManualReview {
        /// on/off
        #[arg(long, value_parser = BoolishValueParser::new())]
        enabled: Option<bool>,

        /// Single withdrawal amount above which review is required
        #[arg(long)]
        single: Option<String>,

        /// Daily total above which review is required
        #[arg(long)]
        daily: Option<String>,
    },

    /// Set a scalar setting (require-kyc-first-withdrawal, deposit-margin,
    /// withdrawal-margin, duplicate-account-checks)
    Toggle {
        name: String,

        /// on/off for flags, a percentage for margins
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("withdrawal_settings=info".parse().unwrap()),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let args = SessionArgs {
        brand: cli.brand,
        offline: cli.offline,
    };

    // Execute command
    let result = match cli.command {
        Commands::Show => commands::show(&config, &args).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config, &args).await,
        Commands::GlobalLimits { min, max, enabled } => {
            commands::global_limits(&config, &args, min.as_deref(), max.as_deref(), enabled).await
        }
        Commands::ChainLimits { chain, min, max } => {
            commands::chain_limits(&config, &args, &chain, min.as_deref(), max.as_deref()).await
        }
        Commands::Validation { enabled } => commands::validation(&config, &args, enabled).await,
        Commands::Pause { reason, force } => commands::pause(&config, &args, &reason, force).await,
        Commands::Resume { reason } => commands::resume(&config, &args, &reason).await,
        Commands::Thresholds {
            cumulative_kyc_limit,
            cumulative_kyc,
            kyc_daily_limit,
            kyc_daily,
        } => {
            commands::thresholds(
                &config,
                &args,
                ThresholdsEdit {
                    cumulative_kyc_limit,
                    cumulative_kyc_enabled: cumulative_kyc,
                    kyc_daily_limit,
                    kyc_daily_enabled: kyc_daily,
                },
            )
            .await
        }
        Commands::ManualReview {
            enabled,
            single,
            daily,
        } => {
            commands::manual_review(&config, &args, enabled, single.as_deref(), daily.as_deref())
                .await
        }
        Commands::Toggle { name, value } => commands::toggle(&config, &args, &name, &value).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
