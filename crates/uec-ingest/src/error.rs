//! Error types for the consumption engine
//!
//! Only failures that stop a run or a single file live here. Per-record
//! problems are [`crate::validate::Rejection`] values and malformed filenames
//! are [`crate::extract::MalformedFilename`]; both are counted, not raised.

use crate::event_type::EventType;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// SQL query, connection or transaction error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing or invalid setting, or conflicting options
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or decompressing a log file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two candidate files share a base name in different subdirectories
    #[error("Duplicate filename {filename}: found at {} and {}", first.display(), second.display())]
    DuplicateFilename {
        filename: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A previous run left files in progress
    #[error(
        "{count} {event_type} file(s) left in progress by an earlier run. \
         Run purge-incomplete first, or consume with --retry-incomplete."
    )]
    IncompleteFiles { event_type: EventType, count: usize },

    /// The files table disagrees with what the engine is about to do
    #[error("File state conflict for {filename}: {message}")]
    State { filename: String, message: String },
}

impl IngestError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn state(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::State {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Whether this error ends the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::DuplicateFilename { .. } | Self::IncompleteFiles { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
