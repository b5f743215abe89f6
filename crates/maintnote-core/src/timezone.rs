//! Timezone resolution for locally stated maintenance times.
//!
//! Some notifications give their window as "02:00 - 06:00 local time, Frankfurt".
//! Parsers that need to turn such a time into UTC take a [`TimezoneResolver`]
//! at construction time. [`StaticTimezoneResolver`] is a plain lookup table that
//! is built once and can be shared behind an `Arc`.

use std::collections::HashMap;

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use thiserror::Error;

/// Errors from timezone resolution and conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimezoneError {
    #[error("Timezone resolution failed for location '{0}'")]
    UnknownLocation(String),

    #[error("Unknown timezone '{name}': {reason}")]
    UnknownZone { name: String, reason: String },

    #[error("Local time {local} does not exist in timezone {zone}")]
    NonexistentLocalTime { local: String, zone: String },
}

/// Maps a location name to an IANA timezone.
pub trait TimezoneResolver: Send + Sync {
    fn resolve_timezone(&self, location: &str) -> Result<Tz, TimezoneError>;
}

const DEFAULT_LOCATIONS: &[(&str, Tz)] = &[
    ("amsterdam", Tz::Europe__Amsterdam),
    ("ashburn", Tz::America__New_York),
    ("atlanta", Tz::America__New_York),
    ("berlin", Tz::Europe__Berlin),
    ("brussels", Tz::Europe__Brussels),
    ("chicago", Tz::America__Chicago),
    ("copenhagen", Tz::Europe__Copenhagen),
    ("dallas", Tz::America__Chicago),
    ("denver", Tz::America__Denver),
    ("dubai", Tz::Asia__Dubai),
    ("dublin", Tz::Europe__Dublin),
    ("frankfurt", Tz::Europe__Berlin),
    ("hong kong", Tz::Asia__Hong_Kong),
    ("istanbul", Tz::Europe__Istanbul),
    ("johannesburg", Tz::Africa__Johannesburg),
    ("london", Tz::Europe__London),
    ("los angeles", Tz::America__Los_Angeles),
    ("madrid", Tz::Europe__Madrid),
    ("marseille", Tz::Europe__Paris),
    ("miami", Tz::America__New_York),
    ("milan", Tz::Europe__Rome),
    ("mumbai", Tz::Asia__Kolkata),
    ("new york", Tz::America__New_York),
    ("oslo", Tz::Europe__Oslo),
    ("paris", Tz::Europe__Paris),
    ("prague", Tz::Europe__Prague),
    ("san jose", Tz::America__Los_Angeles),
    ("sao paulo", Tz::America__Sao_Paulo),
    ("seattle", Tz::America__Los_Angeles),
    ("singapore", Tz::Asia__Singapore),
    ("stockholm", Tz::Europe__Stockholm),
    ("sydney", Tz::Australia__Sydney),
    ("tokyo", Tz::Asia__Tokyo),
    ("toronto", Tz::America__Toronto),
    ("vienna", Tz::Europe__Vienna),
    ("warsaw", Tz::Europe__Warsaw),
    ("zurich", Tz::Europe__Zurich),
];

/// Windows zone names, as written by Outlook and Exchange in `TZID` values.
const WINDOWS_ZONES: &[(&str, Tz)] = &[
    ("AUS Eastern Standard Time", Tz::Australia__Sydney),
    ("Arabian Standard Time", Tz::Asia__Dubai),
    ("Central Europe Standard Time", Tz::Europe__Budapest),
    ("Central European Standard Time", Tz::Europe__Warsaw),
    ("Central Standard Time", Tz::America__Chicago),
    ("China Standard Time", Tz::Asia__Shanghai),
    ("E. South America Standard Time", Tz::America__Sao_Paulo),
    ("Eastern Standard Time", Tz::America__New_York),
    ("FLE Standard Time", Tz::Europe__Helsinki),
    ("GMT Standard Time", Tz::Europe__London),
    ("GTB Standard Time", Tz::Europe__Bucharest),
    ("Greenwich Standard Time", Tz::Atlantic__Reykjavik),
    ("India Standard Time", Tz::Asia__Kolkata),
    ("Israel Standard Time", Tz::Asia__Jerusalem),
    ("Mountain Standard Time", Tz::America__Denver),
    ("Pacific Standard Time", Tz::America__Los_Angeles),
    ("Romance Standard Time", Tz::Europe__Paris),
    ("Russian Standard Time", Tz::Europe__Moscow),
    ("Singapore Standard Time", Tz::Asia__Singapore),
    ("South Africa Standard Time", Tz::Africa__Johannesburg),
    ("Tokyo Standard Time", Tz::Asia__Tokyo),
    ("Turkey Standard Time", Tz::Europe__Istanbul),
    ("UTC", Tz::UTC),
    ("W. Europe Standard Time", Tz::Europe__Berlin),
];

/// Table-driven resolver.
///
/// Lookups are case-insensitive and use the first comma-separated segment, so
/// `"Frankfurt, Germany"` resolves through the `frankfurt` entry. A location
/// that is itself an IANA name (`"Europe/Paris"`) always resolves.
#[derive(Debug, Clone, Default)]
pub struct StaticTimezoneResolver {
    zones: HashMap<String, Tz>,
}

impl StaticTimezoneResolver {
    /// An empty table; only IANA names resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table preloaded with the usual carrier-hotel cities.
    pub fn with_defaults() -> Self {
        let mut resolver = Self::new();
        for (location, zone) in DEFAULT_LOCATIONS {
            resolver.insert(location, *zone);
        }
        resolver
    }

    pub fn insert(&mut self, location: &str, zone: Tz) -> &mut Self {
        self.zones.insert(location_key(location), zone);
        self
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl TimezoneResolver for StaticTimezoneResolver {
    fn resolve_timezone(&self, location: &str) -> Result<Tz, TimezoneError> {
        if let Some(zone) = self.zones.get(&location_key(location)) {
            return Ok(*zone);
        }
        parse_timezone(location.trim())
            .map_err(|_| TimezoneError::UnknownLocation(location.to_string()))
    }
}

fn location_key(location: &str) -> String {
    location
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Parse an IANA timezone name, or a Windows zone name such as
/// `W. Europe Standard Time`.
pub fn parse_timezone(name: &str) -> Result<Tz, TimezoneError> {
    name.parse::<Tz>().or_else(|e| {
        windows_zone(name).ok_or_else(|| TimezoneError::UnknownZone {
            name: name.to_string(),
            reason: e.to_string(),
        })
    })
}

fn windows_zone(name: &str) -> Option<Tz> {
    let name = name.trim();
    WINDOWS_ZONES
        .iter()
        .find(|(windows, _)| windows.eq_ignore_ascii_case(name))
        .map(|(_, zone)| *zone)
}

/// Convert a wall-clock time in `zone` to UTC epoch seconds.
///
/// Ambiguous times (the repeated hour when clocks go back) take the earlier
/// instant. Times skipped by a forward change are an error.
pub fn local_to_timestamp(local: NaiveDateTime, zone: Tz) -> Result<i64, TimezoneError> {
    zone.from_local_datetime(&local)
        .earliest()
        .map(|instant| instant.timestamp())
        .ok_or_else(|| TimezoneError::NonexistentLocalTime {
            local: local.to_string(),
            zone: zone.name().to_string(),
        })
}
