//! UEC Common Library
//!
//! Shared utilities for the user event consumer workspace.
//!
//! Currently this is the logging setup used by the `uec` binary and by
//! integration tests, so every entry point configures `tracing` the same way.
//!
//! # Example
//!
//! ```no_run
//! use uec_common::logging::{init_logging, LogConfig, LogLevel};
//!
//! let config = LogConfig::builder().level(LogLevel::Debug).build();
//! init_logging(&config).ok();
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput};
