//! CentralNotice banner impression events

use super::{
    is_valid_language_code, is_valid_project_identifier, truncate, IgnoreReason, Record,
    Rejection, Verdict,
};
use crate::config::CentralNoticeRules;
use chrono::NaiveDateTime;
use regex::Regex;

/// `statusCode` value meaning the banner was displayed (sent as a string)
const BANNER_SHOWN_STATUS: &str = "6";

const BANNER_LIMIT: usize = 255;
const CAMPAIGN_LIMIT: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub struct CentralNoticeEvent {
    pub uuid: String,
    pub time: NaiveDateTime,
    pub banner: Option<String>,
    pub campaign: Option<String>,
    pub project: String,
    pub language: String,
    pub country: Option<String>,
    /// Banner preview rather than a live campaign
    pub testing: bool,
}

fn is_valid_banner(banner: &str) -> bool {
    !banner.is_empty() && banner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate(
    line: &[u8],
    default_str: &Regex,
    rules: &CentralNoticeRules,
) -> Result<Verdict<CentralNoticeEvent>, Rejection> {
    let record = Record::parse(line)?;

    let testing = record.event_bool("testingBanner")?.unwrap_or(false);

    let banner_shown = record
        .event_str("statusCode")?
        .ok_or(Rejection::Missing("event.statusCode"))?
        == BANNER_SHOWN_STATUS;

    let language = record
        .event_str("uselang")?
        .ok_or(Rejection::Missing("event.uselang"))?;
    if !is_valid_language_code(language) {
        return Err(Rejection::Invalid {
            field: "event.uselang",
            value: language.to_string(),
        });
    }
    if !rules.languages.contains(language) {
        return Err(Rejection::LanguageNotAllowed(language.to_string()));
    }

    let project = record.event_str("db")?.ok_or(Rejection::Missing("event.db"))?;
    if !is_valid_project_identifier(project) {
        return Err(Rejection::Invalid {
            field: "event.db",
            value: project.to_string(),
        });
    }
    if !rules.projects.is_match(project) {
        return Err(Rejection::ProjectNotAllowed(project.to_string()));
    }

    let banner = record.event_str("banner")?;
    if let Some(b) = banner.filter(|b| !is_valid_banner(b)) {
        return Err(Rejection::Invalid {
            field: "event.banner",
            value: b.to_string(),
        });
    }

    let campaign = record.event_str("campaign")?;
    if let Some(c) = campaign.filter(|c| !default_str.is_match(c)) {
        return Err(Rejection::Invalid {
            field: "event.campaign",
            value: c.to_string(),
        });
    }

    if campaign.map_or(true, str::is_empty) && !testing {
        return Err(Rejection::NoCampaign);
    }

    if record.is_bot {
        return Ok(Verdict::Ignore(IgnoreReason::Bot));
    }
    if !banner_shown {
        return Ok(Verdict::Ignore(IgnoreReason::BannerNotShown));
    }

    let uuid = record.uuid.as_str();
    Ok(Verdict::Consume(CentralNoticeEvent {
        banner: banner.map(|b| truncate(uuid, "banner", b, BANNER_LIMIT)),
        campaign: campaign.map(|c| truncate(uuid, "campaign", c, CAMPAIGN_LIMIT)),
        project: project.to_string(),
        language: language.to_string(),
        country: record.country.clone(),
        uuid: record.uuid.clone(),
        time: record.time,
        testing,
    }))
}
