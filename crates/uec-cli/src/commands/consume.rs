//! `uec consume` command implementation

use super::{connect, print_summary};
use crate::error::{CliError, Result};
use chrono::NaiveDateTime;
use colored::Colorize;
use std::path::Path;
use tracing::info;
use uec_ingest::config::Settings;
use uec_ingest::orchestrator::{ConsumeOptions, Consumer};
use uec_ingest::select::SelectionWindow;
use uec_ingest::EventType;

/// Consume every selected file for `event_type`
///
/// Settings and the window are validated before connecting, so a bad
/// invocation never touches the database.
pub async fn run(
    config_path: Option<&Path>,
    event_type: EventType,
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
    from_latest_consumed: bool,
    retry_incomplete: bool,
) -> Result<()> {
    let settings = Settings::load(config_path)?;
    let consumer_config = settings.consumer_config(event_type)?;
    let window = SelectionWindow::new(from, from_latest_consumed, to)?;

    let pool = connect(&settings).await?;
    info!(%event_type, directory = %consumer_config.directory.display(), "Starting consume run");

    let options = ConsumeOptions::new(window).retry_incomplete(retry_incomplete);
    let stats = Consumer::new(pool, consumer_config).run(&options).await?;

    let header = format!("Consumed {} logs", event_type.display_name());
    print_summary(&header, &stats.describe());

    if stats.has_failures() {
        println!("{}", "Some files were left in progress.".yellow());
        return Err(CliError::FilesFailed {
            event_type,
            failed: stats.failures().len(),
        });
    }

    println!("{} Done", "✓".green());
    Ok(())
}
