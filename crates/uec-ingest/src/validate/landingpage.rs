//! LandingPage view events

use super::{is_valid_language_code, truncate, IgnoreReason, Record, Rejection, Verdict};
use crate::config::LandingPageRules;
use chrono::NaiveDateTime;
use regex::Regex;

const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_COUNTRY: &str = "XX";

const SPECIAL_LANDING_PAGE: &str = "Special:LandingPage";
const COMPONENT_DEFAULT: &str = "default";
const COMPONENT_SEPARATOR: char = '-';
const COMPONENT_JOIN: &str = "~";

const VALIDATED_FIELD_COUNT: usize = 12;

/// Optional string fields checked against the default string rule
const DEFAULT_VALIDATED: [&str; VALIDATED_FIELD_COUNT] = [
    "utm_source",
    "utm_campaign",
    "utm_medium",
    "utm_key",
    "contact_id",
    "link_id",
    "template",
    "appeal",
    "appeal_template",
    "form_template",
    "form_countryspecific",
    "landingpage",
];

/// Joined, in this order, into the page name for `Special:LandingPage` views
const COMPONENTS: [&str; 5] = [
    "template",
    "appeal_template",
    "appeal",
    "form_template",
    "form_countryspecific",
];

#[derive(Debug, Clone, PartialEq)]
pub struct LandingPageEvent {
    pub uuid: String,
    pub time: NaiveDateTime,
    pub utm_source: String,
    pub utm_campaign: String,
    pub utm_medium: String,
    pub utm_key: String,
    pub contact_id: String,
    pub link_id: String,
    pub landingpage: String,
    pub project: String,
    pub language: String,
    pub country: String,
}

/// Text after the last separator, else before it, else the default
fn trim_component(value: &str) -> &str {
    match value.rsplit_once(COMPONENT_SEPARATOR) {
        Some((_, after)) if !after.is_empty() => after,
        Some((before, _)) if !before.is_empty() => before,
        Some(_) => COMPONENT_DEFAULT,
        None if value.is_empty() => COMPONENT_DEFAULT,
        None => value,
    }
}

pub fn validate(
    line: &[u8],
    default_str: &Regex,
    rules: &LandingPageRules,
) -> Result<Verdict<LandingPageEvent>, Rejection> {
    let record = Record::parse(line)?;

    let language = match record.event_str("language")? {
        None => DEFAULT_LANGUAGE,
        Some(code) if is_valid_language_code(code) => code,
        Some(code) => {
            return Err(Rejection::Invalid {
                field: "event.language",
                value: code.to_string(),
            })
        }
    };

    let mut fields: [Option<&str>; VALIDATED_FIELD_COUNT] = [None; VALIDATED_FIELD_COUNT];
    for (slot, field) in fields.iter_mut().zip(DEFAULT_VALIDATED) {
        let value = record.event_str(field)?;
        if let Some(v) = value.filter(|v| !default_str.is_match(v)) {
            return Err(Rejection::Invalid {
                field,
                value: v.to_string(),
            });
        }
        *slot = value;
    }
    let field = |name: &str| {
        DEFAULT_VALIDATED
            .iter()
            .position(|f| *f == name)
            .and_then(|i| fields[i])
    };

    let project = record.root_str("wiki")?.ok_or(Rejection::Missing("wiki"))?;
    if !default_str.is_match(project) {
        return Err(Rejection::Invalid {
            field: "wiki",
            value: project.to_string(),
        });
    }

    let landingpage = match field("landingpage") {
        Some(SPECIAL_LANDING_PAGE) => COMPONENTS
            .into_iter()
            .map(|c| trim_component(field(c).unwrap_or(COMPONENT_DEFAULT)))
            .collect::<Vec<_>>()
            .join(COMPONENT_JOIN),
        other => other.unwrap_or_default().to_string(),
    };

    if record.is_bot {
        return Ok(Verdict::Ignore(IgnoreReason::Bot));
    }
    if !rules.consumable_projects.contains(project) {
        return Ok(Verdict::Ignore(IgnoreReason::ProjectNotConsumed));
    }

    let uuid = record.uuid.as_str();
    let limited = |name: &'static str, limit: usize| {
        truncate(uuid, name, field(name).unwrap_or_default(), limit)
    };

    Ok(Verdict::Consume(LandingPageEvent {
        utm_source: limited("utm_source", 255),
        utm_campaign: limited("utm_campaign", 255),
        utm_medium: limited("utm_medium", 255),
        utm_key: limited("utm_key", 128),
        contact_id: limited("contact_id", 255),
        link_id: limited("link_id", 128),
        landingpage: truncate(uuid, "landingpage", &landingpage, 255),
        project: truncate(uuid, "wiki", project, 255),
        language: language.to_string(),
        country: record
            .country
            .clone()
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        uuid: record.uuid.clone(),
        time: record.time,
    }))
}
