//! Candidate file selection
//!
//! Selection runs in two steps. [`FileSelector::scan`] walks the directory
//! tree and extracts filename metadata (pure filesystem work). Then
//! [`FileSelector::select`] resolves the window against the file state store
//! and drops files that are already complete or fall outside it. Every call
//! recomputes the result from scratch.

use crate::config::{ConsumerConfig, EventProfile};
use crate::db::file_state;
use crate::error::{IngestError, Result};
use crate::extract::{check_lengths, MalformedFilename};
use crate::reader::is_compressed;
use chrono::NaiveDateTime;
use sqlx::PgConnection;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Which files a run may consider, by filename timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionWindow {
    lower: LowerBound,
    to: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LowerBound {
    Unbounded,
    From(NaiveDateTime),
    /// Timestamp of the most recently completed file
    LatestConsumed,
}

impl SelectionWindow {
    /// Build a window; `from` and `from_latest` are mutually exclusive
    pub fn new(
        from: Option<NaiveDateTime>,
        from_latest: bool,
        to: Option<NaiveDateTime>,
    ) -> Result<Self> {
        let lower = match (from, from_latest) {
            (Some(_), true) => {
                return Err(IngestError::config(
                    "--from and --from-latest-consumed are mutually exclusive",
                ))
            }
            (Some(from), false) => LowerBound::From(from),
            (None, true) => LowerBound::LatestConsumed,
            (None, false) => LowerBound::Unbounded,
        };

        if let (LowerBound::From(from), Some(to)) = (lower, to) {
            if from > to {
                return Err(IngestError::config(format!(
                    "--from {} is after --to {}",
                    from, to
                )));
            }
        }

        Ok(Self { lower, to })
    }

    /// Every file, whatever its timestamp
    pub fn all() -> Self {
        Self {
            lower: LowerBound::Unbounded,
            to: None,
        }
    }

    pub fn uses_watermark(&self) -> bool {
        self.lower == LowerBound::LatestConsumed
    }

    /// Fix the lower bound, given the watermark when one is needed
    pub fn resolve(&self, watermark: Option<NaiveDateTime>) -> ResolvedWindow {
        let from = match self.lower {
            LowerBound::Unbounded => None,
            LowerBound::From(from) => Some(from),
            LowerBound::LatestConsumed => watermark,
        };
        ResolvedWindow { from, to: self.to }
    }
}

/// Inclusive timestamp bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl ResolvedWindow {
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.from.map_or(true, |from| timestamp >= from)
            && self.to.map_or(true, |to| timestamp <= to)
    }
}

/// A log file that passed filename checks
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub filename: String,
    pub directory: String,
    pub timestamp: NaiveDateTime,
    /// Only set for event types that carry a sample rate
    pub sample_rate: Option<f64>,
    pub compressed: bool,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub candidates: Vec<CandidateFile>,
    pub malformed: Vec<(PathBuf, MalformedFilename)>,
}

/// Files to consume, in processing order, plus what was left out
#[derive(Debug, Default)]
pub struct Selection {
    pub files: Vec<CandidateFile>,
    pub malformed: Vec<(PathBuf, MalformedFilename)>,
    pub skipped_complete: u64,
    pub outside_window: u64,
}

impl IntoIterator for Selection {
    type Item = CandidateFile;
    type IntoIter = std::vec::IntoIter<CandidateFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

pub struct FileSelector<'a> {
    config: &'a ConsumerConfig,
}

impl<'a> FileSelector<'a> {
    pub fn new(config: &'a ConsumerConfig) -> Self {
        Self { config }
    }

    /// Walk the configured directory and describe every matching file
    ///
    /// Symlinks are not followed. A base name seen twice is fatal since
    /// filenames are the state store's key.
    pub fn scan(&self) -> Result<ScanResult> {
        let root = &self.config.directory;
        if !root.is_dir() {
            return Err(IngestError::config(format!(
                "{} directory {} does not exist",
                self.config.event_type,
                root.display()
            )));
        }

        let mut result = ScanResult::default();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };

            if !entry.file_type().is_file()
                || !self.config.file_glob.is_match(entry.file_name())
            {
                continue;
            }

            let path = entry.into_path();
            match self.describe(&path) {
                Ok(candidate) => {
                    if let Some(first) = seen.insert(candidate.filename.clone(), path.clone()) {
                        return Err(IngestError::DuplicateFilename {
                            filename: candidate.filename,
                            first,
                            second: path,
                        });
                    }
                    result.candidates.push(candidate);
                }
                Err(reason) => {
                    warn!(path = %path.display(), %reason, "Malformed filename, skipping");
                    result.malformed.push((path, reason));
                }
            }
        }

        debug!(
            candidates = result.candidates.len(),
            malformed = result.malformed.len(),
            "Directory scan finished"
        );
        Ok(result)
    }

    fn describe(&self, path: &Path) -> std::result::Result<CandidateFile, MalformedFilename> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(MalformedFilename::NotUnicode)?
            .to_string();
        let directory = path
            .parent()
            .map(|p| p.to_str().ok_or(MalformedFilename::NotUnicode))
            .transpose()?
            .unwrap_or_default()
            .to_string();

        check_lengths(&filename, &directory)?;
        let timestamp = self.config.timestamp.extract(&filename)?;

        let sample_rate = match &self.config.profile {
            EventProfile::CentralNotice(rules) => Some(rules.sample_rate.extract(&filename)?),
            EventProfile::LandingPage(_) => None,
        };

        Ok(CandidateFile {
            compressed: is_compressed(path),
            path: path.to_path_buf(),
            filename,
            directory,
            timestamp,
            sample_rate,
        })
    }

    /// Scan, then filter against the file state store and the window
    pub async fn select(
        &self,
        conn: &mut PgConnection,
        window: &SelectionWindow,
    ) -> Result<Selection> {
        let scan = self.scan()?;
        let event_type = self.config.event_type;

        let watermark = if window.uses_watermark() {
            let latest = file_state::latest_completed_timestamp(&mut *conn, event_type).await?;
            info!(%event_type, watermark = ?latest, "Resolved latest consumed watermark");
            latest
        } else {
            None
        };
        let complete = file_state::completed_filenames(&mut *conn, event_type).await?;

        Ok(partition(scan, &window.resolve(watermark), &complete))
    }
}

/// Split scanned files into those to consume and those to skip
pub fn partition(
    scan: ScanResult,
    window: &ResolvedWindow,
    complete: &HashSet<String>,
) -> Selection {
    let mut selection = Selection {
        malformed: scan.malformed,
        ..Default::default()
    };

    for candidate in scan.candidates {
        if complete.contains(&candidate.filename) {
            selection.skipped_complete += 1;
        } else if !window.contains(candidate.timestamp) {
            selection.outside_window += 1;
        } else {
            selection.files.push(candidate);
        }
    }

    selection
        .files
        .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.filename.cmp(&b.filename)));
    selection
}
