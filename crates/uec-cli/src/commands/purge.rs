//! `uec purge-incomplete` command implementation
//!
//! Destructive: asks for confirmation unless `--yes` is given.

use super::{connect, print_summary};
use crate::error::Result;
use colored::Colorize;
use inquire::Confirm;
use std::path::Path;
use uec_ingest::config::Settings;
use uec_ingest::purge::{incomplete_files, purge_incomplete};
use uec_ingest::EventType;

pub async fn run(config_path: Option<&Path>, event_type: EventType, yes: bool) -> Result<()> {
    let settings = Settings::load(config_path)?;
    let pool = connect(&settings).await?;

    let pending = incomplete_files(&pool, event_type).await?;
    if pending.is_empty() {
        println!("No incomplete {} files.", event_type.display_name());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{} {} file(s) were left in progress:",
            pending.len(),
            event_type.display_name()
        )
        .yellow()
    );
    for row in &pending {
        println!("  {} (claimed {})", row.filename, row.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();

    if !yes {
        let confirmed = Confirm::new("Delete all data and state for these files?")
            .with_default(false)
            .with_help_message("Only do this when no consume run is active")
            .prompt()?;

        if !confirmed {
            println!("Purge cancelled.");
            return Ok(());
        }
    }

    let stats = purge_incomplete(&pool, event_type).await?;
    print_summary("Purged incomplete files", &stats.describe());
    println!("{} Done", "✓".green());

    Ok(())
}
