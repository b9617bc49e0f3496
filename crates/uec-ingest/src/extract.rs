//! Filename-derived metadata: timestamp and sample rate
//!
//! Both extractions are pure functions of the file name. A configured regex
//! picks a substring (its first capture group if it has one, otherwise the
//! whole match), which is then parsed.

use crate::error::{IngestError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use thiserror::Error;

/// Longest file name the files table accepts
pub const MAX_FILENAME_LEN: usize = 128;

/// Longest directory the files table accepts
pub const MAX_DIRECTORY_LEN: usize = 256;

/// Sample rates are percentages
pub const MAX_SAMPLE_RATE: f64 = 100.0;

/// Why a candidate file was excluded from a run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedFilename {
    #[error("file name is {0} characters long (max {MAX_FILENAME_LEN})")]
    FilenameTooLong(usize),

    #[error("directory is {0} characters long (max {MAX_DIRECTORY_LEN})")]
    DirectoryTooLong(usize),

    #[error("file name is not valid UTF-8")]
    NotUnicode,

    #[error("no timestamp found in file name")]
    NoTimestamp,

    #[error("timestamp '{value}' does not match format '{format}'")]
    BadTimestamp { value: String, format: String },

    #[error("sample rate '{0}' is not a number in (0, 100]")]
    BadSampleRate(String),
}

/// First capture group when the pattern has one, otherwise the whole match
fn captured<'h>(pattern: &Regex, haystack: &'h str) -> Option<&'h str> {
    let caps = pattern.captures(haystack)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str())
}

fn compile(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| IngestError::config(format!("Invalid {} '{}': {}", name, pattern, e)))
}

#[derive(Debug, Clone)]
pub struct TimestampPattern {
    regex: Regex,
    format: String,
}

impl TimestampPattern {
    pub fn new(regex: &str, format: &str) -> Result<Self> {
        if format.trim().is_empty() {
            return Err(IngestError::config("timestamp_format_in_filenames is empty"));
        }

        Ok(Self {
            regex: compile("extract_timestamp_regex", regex)?,
            format: format.to_string(),
        })
    }

    /// Extract and parse the timestamp embedded in a file name
    ///
    /// Formats without a time part yield midnight of that day.
    pub fn extract(&self, filename: &str) -> std::result::Result<NaiveDateTime, MalformedFilename> {
        let value = captured(&self.regex, filename).ok_or(MalformedFilename::NoTimestamp)?;

        NaiveDateTime::parse_from_str(value, &self.format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, &self.format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(|| MalformedFilename::BadTimestamp {
                value: value.to_string(),
                format: self.format.clone(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct SampleRatePattern {
    regex: Option<Regex>,
    default: f64,
}

impl SampleRatePattern {
    pub fn new(regex: Option<&str>, default: f64) -> Result<Self> {
        if !is_valid_sample_rate(default) {
            return Err(IngestError::config(format!(
                "default_sample_rate {} must be in (0, {}]",
                default, MAX_SAMPLE_RATE
            )));
        }

        let regex = regex
            .map(|r| compile("extract_sample_rate_regex", r))
            .transpose()?;

        Ok(Self { regex, default })
    }

    pub fn default_rate(&self) -> f64 {
        self.default
    }

    /// Sample rate encoded in the file name, or the default when there is none
    pub fn extract(&self, filename: &str) -> std::result::Result<f64, MalformedFilename> {
        let Some(value) = self.regex.as_ref().and_then(|r| captured(r, filename)) else {
            return Ok(self.default);
        };

        value
            .parse::<f64>()
            .ok()
            .filter(|rate| is_valid_sample_rate(*rate))
            .ok_or_else(|| MalformedFilename::BadSampleRate(value.to_string()))
    }
}

fn is_valid_sample_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0 && rate <= MAX_SAMPLE_RATE
}

/// Reject names that would not fit the files table
pub fn check_lengths(filename: &str, directory: &str) -> std::result::Result<(), MalformedFilename> {
    let filename_len = filename.chars().count();
    if filename_len > MAX_FILENAME_LEN {
        return Err(MalformedFilename::FilenameTooLong(filename_len));
    }

    let directory_len = directory.chars().count();
    if directory_len > MAX_DIRECTORY_LEN {
        return Err(MalformedFilename::DirectoryTooLong(directory_len));
    }

    Ok(())
}
