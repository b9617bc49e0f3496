//! Error types for UEC CLI
//!
//! Messages are shown to the operator as-is, so each one says what to do
//! next where there is something to do.

use thiserror::Error;
use uec_ingest::{EventType, IngestError};

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// The engine refused to run or could not finish
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// The run finished but some files were aborted
    #[error(
        "{failed} {event_type} file(s) failed and were left in progress. \
         Fix the cause, then run 'uec purge-incomplete {event_type}' or consume with --retry-incomplete."
    )]
    FilesFailed { event_type: EventType, failed: usize },

    /// The confirmation prompt could not be shown or answered
    #[error("Confirmation prompt failed: {0}. Pass --yes to run non-interactively.")]
    Prompt(#[from] inquire::InquireError),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Configuration and usage problems
            Self::Ingest(e) if e.is_fatal() => 2,
            _ => 1,
        }
    }
}
