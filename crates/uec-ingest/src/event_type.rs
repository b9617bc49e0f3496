//! The two event families the engine knows how to consume

use crate::error::IngestError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    CentralNotice,
    LandingPage,
}

impl EventType {
    pub const ALL: [EventType; 2] = [EventType::CentralNotice, EventType::LandingPage];

    /// Key stored in `files.event_type` and accepted on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::CentralNotice => "centralnotice",
            EventType::LandingPage => "landingpage",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EventType::CentralNotice => "CentralNotice",
            EventType::LandingPage => "LandingPage",
        }
    }

    /// Tables holding rows derived from a file of this type, in delete order
    pub fn derived_tables(self) -> &'static [&'static str] {
        match self {
            EventType::CentralNotice => &["centralnotice_events"],
            EventType::LandingPage => &["landingpage_buckets", "donatewiki_unique"],
        }
    }
}

impl FromStr for EventType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                IngestError::config(format!(
                    "Unknown event type '{}' (expected centralnotice or landingpage)",
                    s
                ))
            })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_storage_keys() {
        assert_eq!("centralnotice".parse::<EventType>().unwrap(), EventType::CentralNotice);
        assert_eq!("landingpage".parse::<EventType>().unwrap(), EventType::LandingPage);
    }

    #[test]
    fn test_parse_is_exact() {
        assert!("CentralNotice".parse::<EventType>().is_err());
        assert!("lp".parse::<EventType>().is_err());
    }
}
