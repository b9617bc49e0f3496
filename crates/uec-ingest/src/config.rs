//! Settings loading and compilation
//!
//! [`Settings`] is the raw YAML shape, read with the `config` crate and
//! overridable from `UEC__`-prefixed environment variables. It is compiled
//! per event type into a [`ConsumerConfig`] holding ready-to-use regexes and
//! glob matchers, so nothing downstream touches raw strings or globals.
//!
//! # File lookup
//!
//! 1. The path passed explicitly (`--config`)
//! 2. `UEC_CONFIG`
//! 3. `./uec.yaml`
//! 4. `/etc/uec/uec.yaml`
//!
//! # Environment overrides
//!
//! - `DATABASE_URL` replaces `database.url`
//! - `UEC__LANDINGPAGE__LP_MAX_BATCH=500` replaces `landingpage.lp_max_batch`
//!   (nested keys separated by `__`, lists by `,`)

use crate::error::{IngestError, Result};
use crate::event_type::EventType;
use crate::extract::{SampleRatePattern, TimestampPattern};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
pub const DEFAULT_EXTRACT_TIMESTAMP_REGEX: &str = r"\d{8}-\d{6}";
pub const DEFAULT_STR_VALIDATION_REGEX: &str = r"[\w\-\.:~ ]*$";
pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;
pub const DEFAULT_LP_MAX_BATCH: usize = 1000;
pub const DEFAULT_CONSUMABLE_PROJECT: &str = "donatewiki";

const CONFIG_ENV_VAR: &str = "UEC_CONFIG";
const ENV_PREFIX: &str = "UEC";
const LOCAL_CONFIG: &str = "uec.yaml";
const SYSTEM_CONFIG: &str = "/etc/uec/uec.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default = "default_timestamp_format")]
    pub timestamp_format_in_filenames: String,

    #[serde(default = "default_extract_timestamp_regex")]
    pub extract_timestamp_regex: String,

    #[serde(default = "default_str_validation_regex")]
    pub default_str_validation_regex: String,

    pub centralnotice: Option<CentralNoticeSettings>,

    pub landingpage: Option<LandingPageSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: None,
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                IngestError::config("database.url is not set (settings file or DATABASE_URL)")
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CentralNoticeSettings {
    pub directory: PathBuf,
    pub file_glob: String,
    pub extract_sample_rate_regex: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub default_sample_rate: f64,
    pub detail_languages: Vec<String>,
    pub detail_projects_regex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LandingPageSettings {
    pub directory: PathBuf,
    pub file_glob: String,
    #[serde(default = "default_lp_max_batch")]
    pub lp_max_batch: usize,
    #[serde(default = "default_consumable_projects")]
    pub consumable_projects: Vec<String>,
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

fn default_extract_timestamp_regex() -> String {
    DEFAULT_EXTRACT_TIMESTAMP_REGEX.to_string()
}

fn default_str_validation_regex() -> String {
    DEFAULT_STR_VALIDATION_REGEX.to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_sample_rate() -> f64 {
    DEFAULT_SAMPLE_RATE
}

fn default_lp_max_batch() -> usize {
    DEFAULT_LP_MAX_BATCH
}

fn default_consumable_projects() -> Vec<String> {
    vec![DEFAULT_CONSUMABLE_PROJECT.to_string()]
}

impl Settings {
    /// Locate and load the settings file, then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = Self::locate(explicit)?;
        tracing::debug!(path = %path.display(), "Loading settings");

        let source = config::File::from(path.as_path()).format(config::FileFormat::Yaml);
        Self::build(source)
    }

    /// Parse settings from a YAML string (environment overrides still apply)
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::build(config::File::from_str(yaml, config::FileFormat::Yaml))
    }

    fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(IngestError::config(format!(
                    "Settings file {} does not exist",
                    path.display()
                )));
            }
            return Ok(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if !path.is_file() {
                return Err(IngestError::config(format!(
                    "{} points to {}, which does not exist",
                    CONFIG_ENV_VAR,
                    path.display()
                )));
            }
            return Ok(path);
        }

        [PathBuf::from(LOCAL_CONFIG), PathBuf::from(SYSTEM_CONFIG)]
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| {
                IngestError::config(format!(
                    "No settings file found (tried ./{} and {}; set {} or pass --config)",
                    LOCAL_CONFIG, SYSTEM_CONFIG, CONFIG_ENV_VAR
                ))
            })
    }

    fn build<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let env = config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("centralnotice.detail_languages")
            .with_list_parse_key("landingpage.consumable_projects")
            .try_parsing(true);

        let mut settings: Settings = config::Config::builder()
            .add_source(source)
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| IngestError::config(format!("Failed to read settings: {}", e)))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            settings.database.url = Some(url);
        }

        Ok(settings)
    }

    /// Validate and compile the settings for one event type
    pub fn consumer_config(&self, event_type: EventType) -> Result<ConsumerConfig> {
        let timestamp = TimestampPattern::new(
            &self.extract_timestamp_regex,
            &self.timestamp_format_in_filenames,
        )?;

        // Applied with `match` semantics: anchored at the start only.
        let default_str = Regex::new(&format!("^(?:{})", self.default_str_validation_regex))
            .map_err(|e| {
                IngestError::config(format!("Invalid default_str_validation_regex: {}", e))
            })?;

        let missing = || {
            IngestError::config(format!(
                "No '{}' section in settings",
                event_type.as_str()
            ))
        };

        let (directory, file_glob, profile) = match event_type {
            EventType::CentralNotice => {
                let cn = self.centralnotice.as_ref().ok_or_else(missing)?;
                (&cn.directory, &cn.file_glob, EventProfile::CentralNotice(cn.compile()?))
            }
            EventType::LandingPage => {
                let lp = self.landingpage.as_ref().ok_or_else(missing)?;
                (&lp.directory, &lp.file_glob, EventProfile::LandingPage(lp.compile()?))
            }
        };

        Ok(ConsumerConfig {
            event_type,
            directory: directory.clone(),
            file_glob: compile_glob(file_glob)?,
            timestamp,
            default_str,
            profile,
        })
    }
}

impl CentralNoticeSettings {
    fn compile(&self) -> Result<CentralNoticeRules> {
        if self.detail_languages.is_empty() {
            return Err(IngestError::config("centralnotice.detail_languages is empty"));
        }

        // Same `match` semantics as the default string rule.
        let projects = Regex::new(&format!("^(?:{})", self.detail_projects_regex)).map_err(|e| {
            IngestError::config(format!("Invalid centralnotice.detail_projects_regex: {}", e))
        })?;

        Ok(CentralNoticeRules {
            sample_rate: SampleRatePattern::new(
                self.extract_sample_rate_regex.as_deref(),
                self.default_sample_rate,
            )?,
            languages: self.detail_languages.iter().cloned().collect(),
            projects,
        })
    }
}

impl LandingPageSettings {
    fn compile(&self) -> Result<LandingPageRules> {
        if self.lp_max_batch == 0 {
            return Err(IngestError::config("landingpage.lp_max_batch must be at least 1"));
        }

        Ok(LandingPageRules {
            max_batch: self.lp_max_batch,
            consumable_projects: self.consumable_projects.iter().cloned().collect(),
        })
    }
}

/// Globs select by base name; a directory part would never match
fn compile_glob(glob: &str) -> Result<GlobMatcher> {
    if glob.contains('/') || glob.contains(std::path::MAIN_SEPARATOR) {
        return Err(IngestError::config(format!(
            "file_glob '{}' must not include a directory",
            glob
        )));
    }

    GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| IngestError::config(format!("Invalid file_glob '{}': {}", glob, e)))
}

/// Everything the engine needs to consume one event type
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub event_type: EventType,
    pub directory: PathBuf,
    pub file_glob: GlobMatcher,
    pub timestamp: TimestampPattern,
    /// Default string rule, already anchored at the start
    pub default_str: Regex,
    pub profile: EventProfile,
}

/// Per-family shaping and storage policy
#[derive(Debug, Clone)]
pub enum EventProfile {
    CentralNotice(CentralNoticeRules),
    LandingPage(LandingPageRules),
}

#[derive(Debug, Clone)]
pub struct CentralNoticeRules {
    pub sample_rate: SampleRatePattern,
    pub languages: HashSet<String>,
    pub projects: Regex,
}

#[derive(Debug, Clone)]
pub struct LandingPageRules {
    /// Events buffered before a forced flush
    pub max_batch: usize,
    pub consumable_projects: HashSet<String>,
}
