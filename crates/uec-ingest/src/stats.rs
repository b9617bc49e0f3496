//! Run and purge statistics
//!
//! Counts are accumulated while a run is in flight and frozen into an
//! immutable [`RunStatistics`] when it ends. Per-file counts only reach the
//! run totals once the file's transaction has committed.

use crate::event_type::EventType;
use crate::validate::Rejection;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Counts for one file, merged into the run only on commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTally {
    pub consumed: u64,
    pub ignored: u64,
    pub invalid: u64,
    pub invalid_reasons: BTreeMap<String, u64>,
    /// One per bucket per flush; a row touched by several flushes counts each time
    pub bucket_upserts: u64,
}

impl FileTally {
    pub fn reject(&mut self, rejection: &Rejection) {
        self.invalid += 1;
        *self.invalid_reasons.entry(rejection.category()).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub filename: String,
    pub reason: String,
}

/// Accumulates counts during a run
#[derive(Debug)]
pub struct RunStatisticsBuilder {
    event_type: EventType,
    started: Instant,
    files_consumed: u64,
    files_skipped_complete: u64,
    files_outside_window: u64,
    files_malformed: u64,
    failures: Vec<FileFailure>,
    totals: FileTally,
}

impl RunStatisticsBuilder {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            started: Instant::now(),
            files_consumed: 0,
            files_skipped_complete: 0,
            files_outside_window: 0,
            files_malformed: 0,
            failures: Vec::new(),
            totals: FileTally::default(),
        }
    }

    pub fn skipped(&mut self, already_complete: u64, outside_window: u64, malformed: u64) {
        self.files_skipped_complete += already_complete;
        self.files_outside_window += outside_window;
        self.files_malformed += malformed;
    }

    pub fn file_consumed(&mut self, tally: &FileTally) {
        self.files_consumed += 1;
        self.totals.consumed += tally.consumed;
        self.totals.ignored += tally.ignored;
        self.totals.invalid += tally.invalid;
        self.totals.bucket_upserts += tally.bucket_upserts;
        for (reason, count) in &tally.invalid_reasons {
            *self.totals.invalid_reasons.entry(reason.clone()).or_insert(0) += count;
        }
    }

    pub fn file_failed(&mut self, filename: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(FileFailure {
            filename: filename.into(),
            reason: reason.into(),
        });
    }

    pub fn finish(self) -> RunStatistics {
        RunStatistics {
            event_type: self.event_type,
            files_consumed: self.files_consumed,
            files_skipped_complete: self.files_skipped_complete,
            files_outside_window: self.files_outside_window,
            files_malformed: self.files_malformed,
            failures: self.failures,
            totals: self.totals,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Outcome of one `consume` invocation
#[derive(Debug, Clone)]
pub struct RunStatistics {
    event_type: EventType,
    files_consumed: u64,
    files_skipped_complete: u64,
    files_outside_window: u64,
    files_malformed: u64,
    failures: Vec<FileFailure>,
    totals: FileTally,
    elapsed: Duration,
}

impl RunStatistics {
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn files_consumed(&self) -> u64 {
        self.files_consumed
    }

    pub fn files_skipped_complete(&self) -> u64 {
        self.files_skipped_complete
    }

    pub fn files_outside_window(&self) -> u64 {
        self.files_outside_window
    }

    pub fn files_malformed(&self) -> u64 {
        self.files_malformed
    }

    pub fn failures(&self) -> &[FileFailure] {
        &self.failures
    }

    pub fn events_consumed(&self) -> u64 {
        self.totals.consumed
    }

    pub fn events_ignored(&self) -> u64 {
        self.totals.ignored
    }

    pub fn events_invalid(&self) -> u64 {
        self.totals.invalid
    }

    pub fn invalid_reasons(&self) -> &BTreeMap<String, u64> {
        &self.totals.invalid_reasons
    }

    pub fn bucket_upserts(&self) -> u64 {
        self.totals.bucket_upserts
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether any file was aborted and left in progress
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec![
            format!("{} files consumed: {}", self.event_type.display_name(), self.files_consumed),
            format!("Files skipped (already consumed): {}", self.files_skipped_complete),
            format!("Files skipped (outside window): {}", self.files_outside_window),
            format!("Files skipped (malformed filename): {}", self.files_malformed),
            format!("Files failed (left in progress): {}", self.failures.len()),
        ];
        lines.extend(
            self.failures
                .iter()
                .map(|f| format!("  {}: {}", f.filename, f.reason)),
        );

        lines.push(format!("Events consumed: {}", self.totals.consumed));
        lines.push(format!("Events ignored: {}", self.totals.ignored));
        lines.push(format!("Events invalid: {}", self.totals.invalid));
        lines.extend(
            self.totals
                .invalid_reasons
                .iter()
                .map(|(reason, count)| format!("  {}: {}", reason, count)),
        );

        if self.event_type == EventType::LandingPage {
            lines.push(format!("Bucket upserts: {}", self.totals.bucket_upserts));
        }
        lines.push(format!("Elapsed: {:.2}s", self.elapsed.as_secs_f64()));
        lines
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe().join("\n"))
    }
}

/// Outcome of one `purge-incomplete` invocation
#[derive(Debug, Clone)]
pub struct PurgeStatistics {
    event_type: EventType,
    files_purged: Vec<String>,
    rows_deleted: BTreeMap<&'static str, u64>,
    elapsed: Duration,
}

impl PurgeStatistics {
    pub(crate) fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            files_purged: Vec::new(),
            rows_deleted: BTreeMap::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn record(&mut self, filename: String, deleted: &BTreeMap<&'static str, u64>) {
        self.files_purged.push(filename);
        for (table, rows) in deleted {
            *self.rows_deleted.entry(*table).or_insert(0) += rows;
        }
    }

    pub(crate) fn finish(mut self, started: Instant) -> Self {
        self.elapsed = started.elapsed();
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn files_purged(&self) -> &[String] {
        &self.files_purged
    }

    pub fn rows_deleted(&self, table: &str) -> u64 {
        self.rows_deleted.get(table).copied().unwrap_or(0)
    }

    pub fn total_rows_deleted(&self) -> u64 {
        self.rows_deleted.values().sum()
    }

    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} incomplete files purged: {}",
            self.event_type.display_name(),
            self.files_purged.len()
        )];
        lines.extend(self.files_purged.iter().map(|f| format!("  {}", f)));
        lines.extend(
            self.event_type
                .derived_tables()
                .iter()
                .map(|table| format!("Rows deleted from {}: {}", table, self.rows_deleted(table))),
        );
        lines.push(format!("Elapsed: {:.2}s", self.elapsed.as_secs_f64()));
        lines
    }
}

impl fmt::Display for PurgeStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe().join("\n"))
    }
}
