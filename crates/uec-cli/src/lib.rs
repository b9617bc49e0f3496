//! UEC CLI Library
//!
//! Command-line front end for the event log consumer.
//!
//! # Overview
//!
//! - **Consumption**: Ingest new log files for one event type (`uec consume`)
//! - **Recovery**: Remove data left by an interrupted run (`uec purge-incomplete`)
//!
//! Settings are read from a YAML file; see `uec_ingest::config` for the keys
//! and the lookup order.

pub mod commands;
pub mod error;

pub use error::{CliError, Result};

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uec_ingest::EventType;

/// Timestamp format accepted by `--from` and `--to`
pub const CLI_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// UEC - consume banner and landing page event logs into PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "uec")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to ./uec.yaml, then /etc/uec/uec.yaml)
    #[arg(short, long, env = "UEC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume log files for one event type
    Consume {
        /// Event type: centralnotice or landingpage
        event_type: EventType,

        /// Only files with a filename timestamp at or after this (YYYYMMDDhhmmss)
        #[arg(long, value_parser = parse_timestamp, conflicts_with = "from_latest_consumed")]
        from: Option<NaiveDateTime>,

        /// Only files with a filename timestamp at or before this (YYYYMMDDhhmmss)
        #[arg(long, value_parser = parse_timestamp)]
        to: Option<NaiveDateTime>,

        /// Start from the newest file already consumed for this event type
        #[arg(long)]
        from_latest_consumed: bool,

        /// Reprocess files an interrupted run left in progress
        #[arg(long)]
        retry_incomplete: bool,
    },

    /// Delete the data and state of files left in progress by an interrupted run
    PurgeIncomplete {
        /// Event type: centralnotice or landingpage
        event_type: EventType,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Parse a `YYYYMMDDhhmmss` command-line timestamp
pub fn parse_timestamp(value: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, CLI_TIMESTAMP_FORMAT)
        .map_err(|e| format!("expected YYYYMMDDhhmmss, got '{}': {}", value, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("20230102030405").unwrap();
        assert_eq!(ts.to_string(), "2023-01-02 03:04:05");

        assert!(parse_timestamp("2023-01-02").is_err());
        assert!(parse_timestamp("20231302030405").is_err());
    }

    #[test]
    fn test_consume_arguments() {
        let cli = Cli::try_parse_from([
            "uec",
            "consume",
            "landingpage",
            "--from",
            "20230101000000",
            "--to",
            "20230131235959",
            "--retry-incomplete",
        ])
        .unwrap();

        match cli.command {
            Commands::Consume {
                event_type,
                from,
                to,
                from_latest_consumed,
                retry_incomplete,
            } => {
                assert_eq!(event_type, EventType::LandingPage);
                assert!(from.is_some());
                assert!(to.is_some());
                assert!(!from_latest_consumed);
                assert!(retry_incomplete);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_from_conflicts_with_from_latest_consumed() {
        let result = Cli::try_parse_from([
            "uec",
            "consume",
            "centralnotice",
            "--from",
            "20230101000000",
            "--from-latest-consumed",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        assert!(Cli::try_parse_from(["uec", "consume", "CentralNotice"]).is_err());
        assert!(Cli::try_parse_from(["uec", "purge-incomplete", "banners"]).is_err());
    }

    #[test]
    fn test_purge_arguments() {
        let cli = Cli::try_parse_from(["uec", "purge-incomplete", "centralnotice", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::PurgeIncomplete {
                event_type: EventType::CentralNotice,
                yes: true
            }
        ));
    }
}
