//! Recovery after an interrupted run
//!
//! Every file still `in_progress` loses its derived rows and then its state
//! row, one transaction per file. An interruption during purge therefore
//! leaves each file either fully purged or untouched.

use crate::db::file_state::{self, FileStateRow};
use crate::db::events;
use crate::error::Result;
use crate::event_type::EventType;
use crate::stats::PurgeStatistics;
use sqlx::PgPool;
use std::time::Instant;
use tracing::{info, warn};

/// Files a purge would remove, oldest first
pub async fn incomplete_files(pool: &PgPool, event_type: EventType) -> Result<Vec<FileStateRow>> {
    let mut conn = pool.acquire().await?;
    file_state::incomplete(&mut conn, event_type).await
}

pub async fn purge_incomplete(pool: &PgPool, event_type: EventType) -> Result<PurgeStatistics> {
    let started = Instant::now();
    let mut stats = PurgeStatistics::new(event_type);

    let incomplete = incomplete_files(pool, event_type).await?;
    info!(%event_type, count = incomplete.len(), "Purging incomplete files");

    for row in incomplete {
        let mut tx = pool.begin().await?;

        let deleted = events::delete_for_file(&mut tx, event_type, row.id).await?;
        let removed = file_state::delete_incomplete(&mut tx, row.id).await?;

        if removed == 0 {
            // Completed by a concurrent run since it was listed.
            warn!(filename = %row.filename, "File no longer in progress, leaving it");
            tx.rollback().await?;
            continue;
        }

        tx.commit().await?;
        info!(
            filename = %row.filename,
            rows = deleted.values().sum::<u64>(),
            "Incomplete file purged"
        );
        stats.record(row.filename, &deleted);
    }

    Ok(stats.finish(started))
}
