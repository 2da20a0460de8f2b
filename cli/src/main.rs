use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lifeline_core::config::SwitchConfig;
use lifeline_core::error::codes;
use lifeline_core::switch::Switch;

mod commands;
mod util;

use util::exit_error;

#[derive(Parser)]
#[command(
    name = "lifeline",
    version,
    about = "Lifeline dead man's switch: scheduled tick and operator commands"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one evaluation: send due reminders or escalations, then save.
    /// Meant to be run from a timer or cron.
    Tick {
        /// Decide and log messages, but send and save nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the current cycle and incident state as JSON
    Status,
    /// Print the live confirm (and ack) links
    Links,
    /// Start a new cycle now, clearing missed cycles and any escalation
    Reset {
        /// Required; reset is not reversible
        #[arg(long)]
        yes: bool,
    },
    /// Validate configuration and print a redacted summary
    CheckConfig,
}

fn main() {
    let _ = dotenvy::dotenv();

    // Human-readable logs on stderr; stdout carries JSON results.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifeline_cli=info,lifeline_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match SwitchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            exit_error(
                codes::CONFIG_INVALID,
                &err.to_string(),
                Some(
                    "Set the LIFELINE_* variables (or a .env file) and run `lifeline check-config`.",
                ),
            );
        }
    };
    let switch = Switch::new(Arc::new(config));
    let now = chrono::Utc::now().timestamp();

    let code = match cli.command {
        Commands::Tick { dry_run } => commands::tick::run(&switch, dry_run, now),
        Commands::Status => commands::status::run(&switch, now),
        Commands::Links => commands::links::run(&switch),
        Commands::Reset { yes } => commands::reset::run(&switch, yes, now),
        Commands::CheckConfig => commands::check_config::run(&switch),
    };
    std::process::exit(code);
}
