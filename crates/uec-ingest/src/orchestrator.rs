//! The per-file consumption loop
//!
//! For each selected file, in order:
//!
//! 1. Claim it (`in_progress`, committed on its own)
//! 2. Open it, decompressing `.gz`
//! 3. In one transaction: drop rows a previous attempt left, validate every
//!    line, insert or aggregate, flush, mark `complete`, commit
//!
//! Any error in steps 2-3 rolls the transaction back, so the file stays
//! `in_progress` with no new rows. The failure is recorded and the run moves
//! on to the next file.

use crate::aggregate::Aggregator;
use crate::config::{CentralNoticeRules, ConsumerConfig, EventProfile, LandingPageRules};
use crate::db::{events, file_state};
use crate::error::{IngestError, Result};
use crate::reader::LogFileReader;
use crate::select::{CandidateFile, FileSelector, SelectionWindow};
use crate::stats::{FileTally, RunStatistics, RunStatisticsBuilder};
use crate::validate::{centralnotice, landingpage, Verdict};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, instrument, warn};

/// Per-invocation options
#[derive(Debug, Clone, Copy)]
pub struct ConsumeOptions {
    pub window: SelectionWindow,
    /// Re-attempt files an earlier run left in progress instead of refusing
    pub retry_incomplete: bool,
}

impl ConsumeOptions {
    pub fn new(window: SelectionWindow) -> Self {
        Self {
            window,
            retry_incomplete: false,
        }
    }

    pub fn retry_incomplete(mut self, retry: bool) -> Self {
        self.retry_incomplete = retry;
        self
    }
}

pub struct Consumer {
    pool: PgPool,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(pool: PgPool, config: ConsumerConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Consume every selected file and report what happened
    ///
    /// Only fatal problems (settings, duplicate filenames, files left in
    /// progress without `retry_incomplete`, an unreachable database before
    /// selection) return `Err`. Per-file failures are in the statistics.
    pub async fn run(&self, options: &ConsumeOptions) -> Result<RunStatistics> {
        let event_type = self.config.event_type;
        let mut stats = RunStatisticsBuilder::new(event_type);

        let selection = {
            let mut conn = self.pool.acquire().await?;

            let incomplete = file_state::incomplete(&mut conn, event_type).await?;
            if !incomplete.is_empty() {
                if !options.retry_incomplete {
                    return Err(IngestError::IncompleteFiles {
                        event_type,
                        count: incomplete.len(),
                    });
                }
                warn!(
                    %event_type,
                    count = incomplete.len(),
                    "Retrying files left in progress by an earlier run"
                );
            }

            FileSelector::new(&self.config)
                .select(&mut conn, &options.window)
                .await?
        };

        stats.skipped(
            selection.skipped_complete,
            selection.outside_window,
            selection.malformed.len() as u64,
        );
        info!(
            %event_type,
            files = selection.files.len(),
            skipped_complete = selection.skipped_complete,
            outside_window = selection.outside_window,
            malformed = selection.malformed.len(),
            "Files selected"
        );

        for file in selection {
            match self.consume_file(&file).await {
                Ok(tally) => {
                    info!(
                        filename = %file.filename,
                        consumed = tally.consumed,
                        ignored = tally.ignored,
                        invalid = tally.invalid,
                        "File consumed"
                    );
                    stats.file_consumed(&tally);
                }
                Err(e) => {
                    warn!(filename = %file.filename, error = %e, "File failed, left in progress");
                    stats.file_failed(&file.filename, e.to_string());
                }
            }
        }

        Ok(stats.finish())
    }

    #[instrument(skip(self, file), fields(filename = %file.filename))]
    async fn consume_file(&self, file: &CandidateFile) -> Result<FileTally> {
        let event_type = self.config.event_type;

        let file_id = {
            let mut conn = self.pool.acquire().await?;
            file_state::claim(&mut conn, event_type, file).await?
        };
        debug!(file_id, "File claimed");

        let reader = LogFileReader::open(&file.path)?;
        let mut tx = self.pool.begin().await?;

        let leftover = events::delete_for_file(&mut tx, event_type, file_id).await?;
        let leftover_rows: u64 = leftover.values().sum();
        if leftover_rows > 0 {
            warn!(rows = leftover_rows, "Deleted rows left by an earlier attempt");
        }

        let tally = match &self.config.profile {
            EventProfile::CentralNotice(rules) => {
                self.consume_centralnotice(&mut tx, file_id, file, reader, rules)
                    .await?
            }
            EventProfile::LandingPage(rules) => {
                self.consume_landingpage(&mut tx, file_id, file, reader, rules)
                    .await?
            }
        };

        file_state::mark_complete(&mut tx, file_id, &tally).await?;
        tx.commit().await?;

        Ok(tally)
    }

    async fn consume_centralnotice(
        &self,
        conn: &mut PgConnection,
        file_id: i64,
        file: &CandidateFile,
        reader: LogFileReader,
        rules: &CentralNoticeRules,
    ) -> Result<FileTally> {
        let sample_rate = file
            .sample_rate
            .unwrap_or_else(|| rules.sample_rate.default_rate());
        let mut tally = FileTally::default();

        for line in reader {
            let line = line.map_err(|e| IngestError::io(&file.path, e))?;

            match centralnotice::validate(&line.bytes, &self.config.default_str, rules) {
                Ok(Verdict::Consume(event)) => {
                    events::insert_centralnotice(&mut *conn, file_id, &event, sample_rate).await?;
                    tally.consumed += 1;
                }
                Ok(Verdict::Ignore(reason)) => {
                    debug!(line = line.number, ?reason, "Event ignored");
                    tally.ignored += 1;
                }
                Err(rejection) => {
                    debug!(line = line.number, %rejection, "Invalid event");
                    tally.reject(&rejection);
                }
            }
        }

        Ok(tally)
    }

    async fn consume_landingpage(
        &self,
        conn: &mut PgConnection,
        file_id: i64,
        file: &CandidateFile,
        reader: LogFileReader,
        rules: &LandingPageRules,
    ) -> Result<FileTally> {
        let mut aggregator = Aggregator::new(rules.max_batch);
        let mut tally = FileTally::default();

        for line in reader {
            let line = line.map_err(|e| IngestError::io(&file.path, e))?;

            match landingpage::validate(&line.bytes, &self.config.default_str, rules) {
                Ok(Verdict::Consume(event)) => {
                    tally.consumed += 1;
                    if aggregator.add(&event) {
                        tally.bucket_upserts += flush(&mut *conn, file_id, &mut aggregator).await?;
                    }
                }
                Ok(Verdict::Ignore(reason)) => {
                    debug!(line = line.number, ?reason, "Event ignored");
                    tally.ignored += 1;
                }
                Err(rejection) => {
                    debug!(line = line.number, %rejection, "Invalid event");
                    tally.reject(&rejection);
                }
            }
        }

        tally.bucket_upserts += flush(&mut *conn, file_id, &mut aggregator).await?;
        Ok(tally)
    }
}

/// Write out and clear whatever the aggregator holds
async fn flush(conn: &mut PgConnection, file_id: i64, aggregator: &mut Aggregator) -> Result<u64> {
    if aggregator.is_empty() {
        return Ok(0);
    }

    let batch = aggregator.drain();
    let upserts = events::upsert_buckets(&mut *conn, file_id, &batch.buckets).await?;
    let contacts = events::insert_unique_contacts(&mut *conn, file_id, &batch.contacts).await?;

    debug!(
        events = batch.events,
        buckets = batch.buckets.len(),
        contacts,
        "Landing page batch flushed"
    );
    Ok(upserts)
}
