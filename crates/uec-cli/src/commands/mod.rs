//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod consume;
pub mod purge;

use colored::Colorize;
use uec_ingest::config::Settings;
use uec_ingest::db::{self, PgPool};

/// Connect to the database named in the settings and make sure it answers
async fn connect(settings: &Settings) -> crate::Result<PgPool> {
    let pool = db::create_pool(&settings.database).await?;
    db::health_check(&pool).await?;
    Ok(pool)
}

/// Print a summary block: a bold header, then one line per entry
fn print_summary(header: &str, lines: &[String]) {
    println!();
    println!("{}", header.bold());
    for line in lines {
        println!("  {}", line);
    }
}
