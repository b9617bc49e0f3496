//! Record validation
//!
//! Each log line is one JSON object. [`Record::parse`] checks the fields both
//! event families share; the per-family modules then shape the rest into a
//! typed event or a [`Rejection`]. A rejected line is counted and skipped,
//! never fatal.
//!
//! Valid events can still be ignored (bots, banners that were not shown,
//! projects that are not consumed). Those come back as [`Verdict::Ignore`].

pub mod centralnotice;
pub mod landingpage;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use thiserror::Error;

/// Format of the `dt` field written by the event pipeline
pub const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const LANGUAGE_CODE_LIMIT: usize = 24;
const PROJECT_IDENTIFIER_LIMIT: usize = 128;

/// Why a line was not turned into an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing field {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },

    #[error("language {0} is not in detail_languages")]
    LanguageNotAllowed(String),

    #[error("project {0} does not match detail_projects_regex")]
    ProjectNotAllowed(String),

    #[error("no campaign and not a banner preview")]
    NoCampaign,
}

impl Rejection {
    /// Low-cardinality label used to group rejections in run statistics
    pub fn category(&self) -> String {
        match self {
            Rejection::InvalidUtf8 => "invalid utf-8".to_string(),
            Rejection::InvalidJson(_) => "invalid json".to_string(),
            Rejection::NotAnObject => "not an object".to_string(),
            Rejection::Missing(field) => format!("missing {}", field),
            Rejection::Invalid { field, .. } => format!("invalid {}", field),
            Rejection::LanguageNotAllowed(_) => "language not allowed".to_string(),
            Rejection::ProjectNotAllowed(_) => "project not allowed".to_string(),
            Rejection::NoCampaign => "no campaign".to_string(),
        }
    }

    fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Rejection::Invalid {
            field,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Bot,
    BannerNotShown,
    ProjectNotConsumed,
}

/// A valid event is either stored or deliberately dropped
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T> {
    Consume(T),
    Ignore(IgnoreReason),
}

/// Fields present on every event, plus access to the rest of the record
#[derive(Debug)]
pub struct Record {
    pub uuid: String,
    pub time: NaiveDateTime,
    pub is_bot: bool,
    /// Two-letter code, `None` when absent or empty
    pub country: Option<String>,
    root: Map<String, Value>,
}

impl Record {
    pub fn parse(line: &[u8]) -> Result<Self, Rejection> {
        let text = std::str::from_utf8(line).map_err(|_| Rejection::InvalidUtf8)?;

        let root = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(Rejection::NotAnObject),
            Err(e) => return Err(Rejection::InvalidJson(e.to_string())),
        };

        let uuid = match root.get("uuid") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => return Err(Rejection::invalid("uuid", other.to_string())),
            None => return Err(Rejection::Missing("uuid")),
        };

        match root.get("event") {
            Some(Value::Object(_)) => {}
            Some(other) => return Err(Rejection::invalid("event", other.to_string())),
            None => return Err(Rejection::Missing("event")),
        }

        let time = match root.get("dt") {
            Some(Value::String(s)) => NaiveDateTime::parse_from_str(s, EVENT_TIMESTAMP_FORMAT)
                .map_err(|_| Rejection::invalid("dt", s.as_str()))?,
            Some(other) => return Err(Rejection::invalid("dt", other.to_string())),
            None => return Err(Rejection::Missing("dt")),
        };

        let is_bot = match root.get("userAgent").and_then(|ua| ua.get("is_bot")) {
            Some(Value::Bool(b)) => *b,
            Some(other) => return Err(Rejection::invalid("userAgent.is_bot", other.to_string())),
            None => return Err(Rejection::Missing("userAgent.is_bot")),
        };

        let mut record = Self {
            uuid,
            time,
            is_bot,
            country: None,
            root,
        };

        let country = match record.event_str("country")? {
            None | Some("") => None,
            Some(code) if is_valid_country_code(code) => Some(code.to_string()),
            Some(code) => return Err(Rejection::invalid("country", code)),
        };
        record.country = country;

        Ok(record)
    }

    fn event(&self) -> Option<&Map<String, Value>> {
        self.root.get("event").and_then(Value::as_object)
    }

    /// String field of the `event` object; absent and null both read as `None`
    pub fn event_str(&self, field: &'static str) -> Result<Option<&str>, Rejection> {
        optional_str(self.event().and_then(|e| e.get(field)), field)
    }

    pub fn event_bool(&self, field: &'static str) -> Result<Option<bool>, Rejection> {
        match self.event().and_then(|e| e.get(field)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(Rejection::invalid(field, other.to_string())),
        }
    }

    /// String field at the top level of the record
    pub fn root_str(&self, field: &'static str) -> Result<Option<&str>, Rejection> {
        optional_str(self.root.get(field), field)
    }
}

fn optional_str<'a>(value: Option<&'a Value>, field: &'static str) -> Result<Option<&'a str>, Rejection> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(Rejection::invalid(field, other.to_string())),
    }
}

pub fn is_valid_country_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn is_valid_language_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= LANGUAGE_CODE_LIMIT
        && code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c == '-' || c == '_')
}

pub fn is_valid_project_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() <= PROJECT_IDENTIFIER_LIMIT
        && identifier
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

/// Cut a field down to its column width; the event stays valid
pub(crate) fn truncate(uuid: &str, field: &'static str, value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }

    tracing::warn!(uuid, field, limit, "Field too long, truncating");
    value.chars().take(limit).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BASE: &str = r#"{"uuid":"u-1","dt":"2023-01-02T03:04:05Z","userAgent":{"is_bot":false},"event":{"country":"DE"}}"#;

    #[test]
    fn test_parse_common_fields() {
        let record = Record::parse(BASE.as_bytes()).unwrap();
        assert_eq!(record.uuid, "u-1");
        assert_eq!(record.time.to_string(), "2023-01-02 03:04:05");
        assert!(!record.is_bot);
        assert_eq!(record.country.as_deref(), Some("DE"));
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(Record::parse(b"\xff\xfe").unwrap_err(), Rejection::InvalidUtf8);
        assert!(matches!(Record::parse(b"{not json").unwrap_err(), Rejection::InvalidJson(_)));
        assert_eq!(Record::parse(b"[1,2]").unwrap_err(), Rejection::NotAnObject);
        assert_eq!(
            Record::parse(br#"{"dt":"2023-01-02T03:04:05Z","event":{}}"#).unwrap_err(),
            Rejection::Missing("uuid")
        );

        let no_bot = BASE.replace(r#""userAgent":{"is_bot":false},"#, "");
        assert_eq!(
            Record::parse(no_bot.as_bytes()).unwrap_err(),
            Rejection::Missing("userAgent.is_bot")
        );

        let bad_dt = BASE.replace("2023-01-02T03:04:05Z", "2023-01-02 03:04:05");
        assert!(matches!(
            Record::parse(bad_dt.as_bytes()).unwrap_err(),
            Rejection::Invalid { field: "dt", .. }
        ));
    }

    #[test]
    fn test_country_rules() {
        let empty = BASE.replace(r#""country":"DE""#, r#""country":"""#);
        assert_eq!(Record::parse(empty.as_bytes()).unwrap().country, None);

        let bad = BASE.replace(r#""country":"DE""#, r#""country":"DEU""#);
        assert_eq!(
            Record::parse(bad.as_bytes()).unwrap_err().category(),
            "invalid country"
        );
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_language_code("zh-hans"));
        assert!(!is_valid_language_code("EN"));
        assert!(!is_valid_language_code(&"a".repeat(25)));
        assert!(is_valid_project_identifier("en.wikipedia"));
        assert!(!is_valid_project_identifier("En Wiki"));
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("u", "banner", "abc", 5), "abc");
        assert_eq!(truncate("u", "banner", "äöüäöü", 3), "äöü");
    }
}
