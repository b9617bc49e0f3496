//! UEC Ingest Library
//!
//! The file-consumption engine behind the `uec` binary. It turns event log
//! files (one JSON object per line, plain or gzip) into rows in PostgreSQL
//! for two event families:
//!
//! - **CentralNotice**: banner impressions, one row per consumed event
//! - **LandingPage**: landing page views, pre-summed into per-minute buckets
//!
//! Each file is claimed as `in_progress`, consumed inside a single
//! transaction, and marked `complete` in that same transaction. A file whose
//! run was interrupted stays `in_progress` until [`purge::purge_incomplete`]
//! removes whatever it left behind.
//!
//! # Example
//!
//! ```no_run
//! use uec_ingest::{
//!     config::Settings, db, orchestrator::{ConsumeOptions, Consumer},
//!     select::SelectionWindow, EventType,
//! };
//!
//! # async fn run() -> uec_ingest::Result<()> {
//! let settings = Settings::load(None)?;
//! let config = settings.consumer_config(EventType::CentralNotice)?;
//! let pool = db::create_pool(&settings.database).await?;
//!
//! let options = ConsumeOptions::new(SelectionWindow::new(None, true, None)?);
//! let stats = Consumer::new(pool, config).run(&options).await?;
//! println!("{}", stats);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregate;
pub mod config;
pub mod db;
pub mod error;
pub mod event_type;
pub mod extract;
pub mod orchestrator;
pub mod purge;
pub mod reader;
pub mod select;
pub mod stats;
pub mod validate;

pub use error::{IngestError, Result};
pub use event_type::EventType;
