//! The `files` table: which files are in progress or complete
//!
//! A row is created `in_progress` when a file is claimed and committed on
//! its own, before any derived row is written. It flips to `complete` only
//! inside the transaction that writes the file's rows, so `complete` is never
//! visible without them.

use crate::error::{IngestError, Result};
use crate::event_type::EventType;
use crate::select::CandidateFile;
use crate::stats::FileTally;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::PgConnection;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    InProgress,
    Complete,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::InProgress => "in_progress",
            FileStatus::Complete => "complete",
        }
    }
}

impl FromStr for FileStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(FileStatus::InProgress),
            "complete" => Ok(FileStatus::Complete),
            other => Err(IngestError::state(other, "unknown file status")),
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileStateRow {
    pub id: i64,
    pub filename: String,
    pub event_type: String,
    pub directory: String,
    pub file_timestamp: NaiveDateTime,
    pub sample_rate: Option<f64>,
    pub status: String,
    pub consumed_events: i64,
    pub ignored_events: i64,
    pub invalid_events: i64,
    pub updated_at: DateTime<Utc>,
}

impl FileStateRow {
    pub fn status(&self) -> Result<FileStatus> {
        self.status.parse()
    }
}

const SELECT_COLUMNS: &str = "id, filename, event_type, directory, file_timestamp, sample_rate, \
     status, consumed_events, ignored_events, invalid_events, updated_at";

/// Mark a file as in progress and return its id
///
/// Re-claiming a file left in progress by an earlier run reuses its row. A
/// file that is already complete, or registered under the other event type,
/// cannot be claimed.
pub async fn claim(
    conn: &mut PgConnection,
    event_type: EventType,
    file: &CandidateFile,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO files (filename, event_type, directory, file_timestamp, sample_rate, status)
        VALUES ($1, $2, $3, $4, $5, 'in_progress')
        ON CONFLICT (filename) DO UPDATE
            SET directory = EXCLUDED.directory,
                file_timestamp = EXCLUDED.file_timestamp,
                sample_rate = EXCLUDED.sample_rate,
                updated_at = NOW()
            WHERE files.event_type = EXCLUDED.event_type
              AND files.status = 'in_progress'
        RETURNING id
        "#,
    )
    .bind(&file.filename)
    .bind(event_type.as_str())
    .bind(&file.directory)
    .bind(file.timestamp)
    .bind(file.sample_rate)
    .fetch_optional(&mut *conn)
    .await?;

    id.ok_or_else(|| {
        IngestError::state(
            &file.filename,
            "already complete or registered under another event type",
        )
    })
}

/// Flip a claimed file to complete, recording its counts
pub async fn mark_complete(conn: &mut PgConnection, file_id: i64, tally: &FileTally) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE files
           SET status = 'complete',
               consumed_events = $2,
               ignored_events = $3,
               invalid_events = $4,
               updated_at = NOW()
         WHERE id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(file_id)
    .bind(tally.consumed as i64)
    .bind(tally.ignored as i64)
    .bind(tally.invalid as i64)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(IngestError::state(
            format!("file id {}", file_id),
            "no in-progress row to complete",
        ));
    }
    Ok(())
}

/// Timestamp of the most recent complete file, if any
pub async fn latest_completed_timestamp(
    conn: &mut PgConnection,
    event_type: EventType,
) -> Result<Option<NaiveDateTime>> {
    let latest = sqlx::query_scalar::<_, Option<NaiveDateTime>>(
        "SELECT MAX(file_timestamp) FROM files WHERE event_type = $1 AND status = 'complete'",
    )
    .bind(event_type.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(latest)
}

pub async fn completed_filenames(
    conn: &mut PgConnection,
    event_type: EventType,
) -> Result<HashSet<String>> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT filename FROM files WHERE event_type = $1 AND status = 'complete'",
    )
    .bind(event_type.as_str())
    .fetch_all(&mut *conn)
    .await?;

    Ok(names.into_iter().collect())
}

/// Files left in progress, oldest first
pub async fn incomplete(conn: &mut PgConnection, event_type: EventType) -> Result<Vec<FileStateRow>> {
    let rows = sqlx::query_as::<_, FileStateRow>(&format!(
        "SELECT {} FROM files WHERE event_type = $1 AND status = 'in_progress' \
         ORDER BY file_timestamp, filename",
        SELECT_COLUMNS
    ))
    .bind(event_type.as_str())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

pub async fn find(conn: &mut PgConnection, filename: &str) -> Result<Option<FileStateRow>> {
    let row = sqlx::query_as::<_, FileStateRow>(&format!(
        "SELECT {} FROM files WHERE filename = $1",
        SELECT_COLUMNS
    ))
    .bind(filename)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

/// Remove an in-progress row; complete rows are never touched
pub async fn delete_incomplete(conn: &mut PgConnection, file_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM files WHERE id = $1 AND status = 'in_progress'")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
