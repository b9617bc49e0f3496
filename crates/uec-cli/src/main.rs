//! UEC CLI - Main entry point

use clap::Parser;
use std::process;
use tracing::error;
use uec_cli::{Cli, Commands};
use uec_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Verbose mode logs debug to the console; otherwise only warnings
    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("uec")
        .build();

    // Environment variables take precedence; a bad one falls back to the flags
    let log_config = match log_config.clone().apply_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring logging environment: {}", e);
            log_config
        }
    };

    // The CLI works without logging
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

async fn execute_command(cli: &Cli) -> uec_cli::Result<()> {
    let config = cli.config.as_deref();

    match &cli.command {
        Commands::Consume {
            event_type,
            from,
            to,
            from_latest_consumed,
            retry_incomplete,
        } => {
            uec_cli::commands::consume::run(
                config,
                *event_type,
                *from,
                *to,
                *from_latest_consumed,
                *retry_incomplete,
            )
            .await
        }

        Commands::PurgeIncomplete { event_type, yes } => {
            uec_cli::commands::purge::run(config, *event_type, *yes).await
        }
    }
}
