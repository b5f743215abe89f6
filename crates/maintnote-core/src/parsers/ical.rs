//! iCalendar notifications following the MAINTNOTE extension.
//!
//! Reference: draft-gunter-calext-maintenance-notifications. Every `VEVENT`
//! becomes one partial record:
//!
//! | Property | Field |
//! |----------|-------|
//! | `X-MAINTNOTE-PROVIDER` | `provider` |
//! | `X-MAINTNOTE-ACCOUNT` | `account` |
//! | `X-MAINTNOTE-MAINTENANCE-ID` | `maintenance_id` |
//! | `X-MAINTNOTE-STATUS` | `status` (`NO-CHANGE` when absent) |
//! | `X-MAINTNOTE-OBJECT-ID` | one circuit per property |
//! | `X-MAINTNOTE-IMPACT` | impact of circuits without their own `X-MAINTNOTE-OBJECT-IMPACT` |
//! | `DTSTART`, `DTEND`, `DTSTAMP` | `start`, `end`, `stamp` |
//! | `SUMMARY`, `ORGANIZER`, `UID` | `summary`, `organizer`, `uid` |
//! | `SEQUENCE` | `sequence` (`-1` when absent) |
//!
//! A `TZID` is looked up in the calendar's own `VTIMEZONE` definitions first,
//! then as an IANA or Windows zone name.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Weekday};
use ical::parser::ical::component::IcalTimeZone;
use ical::property::Property;
use ical::IcalParser;
use serde_json::Value;
use thiserror::Error;

use super::{BoxError, Parser, PartialRecord};
use crate::output::Status;
use crate::timezone::{local_to_timestamp, parse_timezone, TimezoneError};

/// Sequence given to events that carry none, so they order before any
/// sequenced update of the same maintenance.
pub const UNSEQUENCED: i64 = -1;

/// Errors reading calendar data.
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Not a valid iCalendar data received: {0}")]
    Invalid(String),

    #[error("Not a valid iCalendar data received: no calendar found")]
    NoCalendar,

    #[error("Invalid {property} value '{value}'")]
    InvalidValue { property: String, value: String },

    #[error(transparent)]
    Timezone(#[from] TimezoneError),
}

/// One `VEVENT` with case-insensitive property access.
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    properties: Vec<Property>,
    zones: Arc<[CalendarZone]>,
}

impl CalendarEvent {
    /// All properties called `name`, in order.
    pub fn properties<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Unescaped text value. Empty and `"None"` values count as absent.
    pub fn value(&self, name: &str) -> Option<String> {
        self.property(name).and_then(property_text)
    }

    /// Epoch seconds of a date or date-time property.
    pub fn timestamp(&self, name: &str) -> Result<Option<i64>, CalendarError> {
        match self.property(name) {
            Some(property) => property_timestamp(property, &self.zones).map(Some),
            None => Ok(None),
        }
    }
}

/// Text of a property value, unescaped. `None` for absent-looking values.
pub fn property_text(property: &Property) -> Option<String> {
    property
        .value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "None")
        .map(unescape)
}

/// First value of a property parameter.
pub fn param<'a>(property: &'a Property, name: &str) -> Option<&'a str> {
    property
        .params
        .as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(|value| value.trim_matches('"'))
}

/// Every event of every calendar in `content`.
///
/// Base64-wrapped payloads are unwrapped first.
pub fn calendar_events(content: &[u8]) -> Result<Vec<CalendarEvent>, CalendarError> {
    let decoded = unwrap_base64(content);
    let payload = decoded.as_deref().unwrap_or(content);

    let mut calendars = 0;
    let mut events = Vec::new();
    for calendar in IcalParser::new(payload) {
        let calendar = calendar.map_err(|e| CalendarError::Invalid(e.to_string()))?;
        calendars += 1;
        let zones: Arc<[CalendarZone]> = calendar
            .timezones
            .iter()
            .filter_map(CalendarZone::from_ical)
            .collect();
        events.extend(calendar.events.into_iter().map(|event| CalendarEvent {
            properties: event.properties,
            zones: Arc::clone(&zones),
        }));
    }

    if calendars == 0 {
        return Err(CalendarError::NoCalendar);
    }
    Ok(events)
}

/// A `VTIMEZONE` block: its id and its `STANDARD`/`DAYLIGHT` observances.
#[derive(Debug, Clone)]
pub struct CalendarZone {
    id: String,
    observances: Vec<Observance>,
}

#[derive(Debug, Clone)]
struct Observance {
    start: NaiveDateTime,
    /// `TZOFFSETTO`, in seconds east of UTC
    offset: i32,
    rule: Option<YearlyRule>,
}

/// `FREQ=YEARLY;BYMONTH=<month>;BYDAY=<week><weekday>`, the only recurrence
/// zone definitions use in practice.
#[derive(Debug, Clone, Copy)]
struct YearlyRule {
    month: u32,
    week: i8,
    weekday: Weekday,
}

impl CalendarZone {
    /// `None` when the block has no id or no usable observance.
    fn from_ical(zone: &IcalTimeZone) -> Option<Self> {
        let id = zone
            .properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case("TZID"))
            .and_then(property_text)?;
        let observances: Vec<Observance> = zone
            .transitions
            .iter()
            .filter_map(|transition| Observance::from_properties(&transition.properties))
            .collect();
        if observances.is_empty() {
            tracing::debug!(zone = %id, "Ignoring VTIMEZONE without usable observances");
            return None;
        }
        Some(Self { id, observances })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// UTC offset in force at a wall-clock time of this zone.
    ///
    /// Times before every observance take the earliest one.
    pub fn offset_at(&self, local: NaiveDateTime) -> i32 {
        self.observances
            .iter()
            .flat_map(|observance| observance.onsets(local.year()))
            .filter(|(onset, _)| *onset <= local)
            .max_by_key(|(onset, _)| *onset)
            .or_else(|| {
                self.observances
                    .iter()
                    .map(|observance| (observance.start, observance.offset))
                    .min_by_key(|(start, _)| *start)
            })
            .map(|(_, offset)| offset)
            .unwrap_or_default()
    }
}

impl Observance {
    fn from_properties(properties: &[Property]) -> Option<Self> {
        let value = |name: &str| {
            properties
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .and_then(|p| p.value.as_deref())
                .map(str::trim)
        };
        let start = NaiveDateTime::parse_from_str(value("DTSTART")?, "%Y%m%dT%H%M%S").ok()?;
        let offset = parse_utc_offset(value("TZOFFSETTO")?)?;
        let rule = value("RRULE").and_then(parse_yearly_rule);
        Some(Self { start, offset, rule })
    }

    /// Onsets in `year` and the year before, with the offset they switch to.
    fn onsets(&self, year: i32) -> Vec<(NaiveDateTime, i32)> {
        let Some(rule) = self.rule else {
            return vec![(self.start, self.offset)];
        };
        [year - 1, year]
            .into_iter()
            .filter_map(|year| rule.date_in(year))
            .map(|date| date.and_time(self.start.time()))
            .filter(|onset| *onset >= self.start)
            .map(|onset| (onset, self.offset))
            .collect()
    }
}

impl YearlyRule {
    fn date_in(&self, year: i32) -> Option<NaiveDate> {
        if self.week > 0 {
            return NaiveDate::from_weekday_of_month_opt(year, self.month, self.weekday, self.week as u8);
        }

        let (next_year, next_month) = if self.month == 12 {
            (year + 1, 1)
        } else {
            (year, self.month + 1)
        };
        let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
        while day.weekday() != self.weekday {
            day = day.pred_opt()?;
        }
        let weeks_back = u64::from(self.week.unsigned_abs()) - 1;
        day.checked_sub_days(Days::new(weeks_back * 7))
            .filter(|date| date.month() == self.month)
    }
}

/// `+0200`, `-0500` or `+053000` as seconds east of UTC.
fn parse_utc_offset(raw: &str) -> Option<i32> {
    let (sign, digits) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    if !(digits.len() == 4 || digits.len() == 6) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| digits.get(range).and_then(|d| d.parse::<i32>().ok());
    let seconds = if digits.len() == 6 { field(4..6)? } else { 0 };
    Some(sign * (field(0..2)? * 3600 + field(2..4)? * 60 + seconds))
}

fn parse_yearly_rule(raw: &str) -> Option<YearlyRule> {
    let mut frequency = None;
    let mut month = None;
    let mut by_day = None;
    for part in raw.split(';') {
        let (key, value) = part.split_once('=')?;
        match key.trim().to_ascii_uppercase().as_str() {
            "FREQ" => frequency = Some(value.trim()),
            "BYMONTH" => month = value.trim().parse::<u32>().ok(),
            "BYDAY" => by_day = Some(value.trim()),
            _ => {}
        }
    }
    if !frequency?.eq_ignore_ascii_case("YEARLY") {
        return None;
    }

    let by_day = by_day?;
    let split = by_day.len().checked_sub(2)?;
    let weekday = match by_day.get(split..)?.to_ascii_uppercase().as_str() {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    };
    let week = match by_day.get(..split)?.trim_start_matches('+') {
        "" => 1,
        number => number.parse::<i8>().ok().filter(|w| *w != 0 && w.abs() <= 5)?,
    };
    Some(YearlyRule {
        month: month.filter(|m| (1..=12).contains(m))?,
        week,
        weekday,
    })
}

fn unwrap_base64(content: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = content
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .ok()
        .filter(|decoded| contains(decoded, b"BEGIN:VCALENDAR"))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn property_timestamp(property: &Property, zones: &[CalendarZone]) -> Result<i64, CalendarError> {
    let invalid = || CalendarError::InvalidValue {
        property: property.name.clone(),
        value: property.value.clone().unwrap_or_default(),
    };
    let raw = property.value.as_deref().map(str::trim).ok_or_else(invalid)?;

    let is_date = param(property, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()));
    if is_date {
        let date = NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| invalid())?;
        return date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc().timestamp())
            .ok_or_else(invalid);
    }

    if let Some(utc) = raw.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
        return Ok(naive.and_utc().timestamp());
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
    match param(property, "TZID") {
        Some(tzid) => zoned_timestamp(naive, tzid, zones),
        None => Ok(naive.and_utc().timestamp()),
    }
}

fn zoned_timestamp(local: NaiveDateTime, tzid: &str, zones: &[CalendarZone]) -> Result<i64, CalendarError> {
    if let Some(zone) = zones.iter().find(|zone| zone.id == tzid.trim()) {
        return Ok(local.and_utc().timestamp() - i64::from(zone.offset_at(local)));
    }
    Ok(local_to_timestamp(local, parse_timezone(tzid)?)?)
}

/// The standard calendar parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ICal;

impl ICal {
    pub const NAME: &'static str = "ical";

    pub fn new() -> Self {
        Self
    }

    fn event_record(event: &CalendarEvent) -> Result<PartialRecord, CalendarError> {
        let mut record = PartialRecord::new();

        let texts = [
            ("provider", "X-MAINTNOTE-PROVIDER"),
            ("account", "X-MAINTNOTE-ACCOUNT"),
            ("maintenance_id", "X-MAINTNOTE-MAINTENANCE-ID"),
            ("summary", "SUMMARY"),
            ("organizer", "ORGANIZER"),
            ("uid", "UID"),
        ];
        for (field, name) in texts {
            if let Some(value) = event.value(name) {
                record.insert(field.into(), Value::String(value));
            }
        }

        let status = event
            .value("X-MAINTNOTE-STATUS")
            .unwrap_or_else(|| Status::NoChange.as_str().to_string());
        record.insert("status".into(), Value::String(status));

        for (field, name) in [("start", "DTSTART"), ("end", "DTEND"), ("stamp", "DTSTAMP")] {
            if let Some(timestamp) = event.timestamp(name)? {
                record.insert(field.into(), timestamp.into());
            }
        }

        let sequence = match event.value("SEQUENCE") {
            Some(raw) => raw.parse::<i64>().map_err(|_| CalendarError::InvalidValue {
                property: "SEQUENCE".into(),
                value: raw.clone(),
            })?,
            None => UNSEQUENCED,
        };
        record.insert("sequence".into(), sequence.into());

        let event_impact = event.value("X-MAINTNOTE-IMPACT");
        let circuits: Vec<Value> = event
            .properties("X-MAINTNOTE-OBJECT-ID")
            .filter_map(|object| {
                let circuit_id = property_text(object)?;
                let mut circuit = PartialRecord::new();
                circuit.insert("circuit_id".into(), Value::String(circuit_id));
                let impact = param(object, "X-MAINTNOTE-OBJECT-IMPACT")
                    .map(str::to_string)
                    .or_else(|| event_impact.clone());
                if let Some(impact) = impact {
                    circuit.insert("impact".into(), Value::String(impact));
                }
                Some(Value::Object(circuit))
            })
            .collect();
        if !circuits.is_empty() {
            record.insert("circuits".into(), Value::Array(circuits));
        }

        Ok(record)
    }
}

impl Parser for ICal {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn data_types(&self) -> &[&str] {
        &["ical", "text/calendar"]
    }

    fn parse_data(&self, content: &[u8], _data_type: &str) -> Result<Vec<PartialRecord>, BoxError> {
        let events = calendar_events(content)?;
        let records = events
            .iter()
            .map(Self::event_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAINTNOTE_EXAMPLE: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//Maint Note//https://github.com/maint-notification//\r
BEGIN:VEVENT\r
SUMMARY:Maint Note Example\\, with escapes\r
DTSTART;VALUE=DATE-TIME:20151010T080000Z\r
DTEND;VALUE=DATE-TIME:20151010T100000Z\r
DTSTAMP;VALUE=DATE-TIME:20151010T001000Z\r
UID:42\r
SEQUENCE:1\r
X-MAINTNOTE-PROVIDER:example.com\r
X-MAINTNOTE-ACCOUNT:137.035999173\r
X-MAINTNOTE-MAINTENANCE-ID:WorkOrder-31415\r
X-MAINTNOTE-OBJECT-ID;X-MAINTNOTE-OBJECT-IMPACT=NO-IMPACT:acme-widgets-as-a-service\r
X-MAINTNOTE-OBJECT-ID:acme-widgets-as-a-service-2\r
X-MAINTNOTE-IMPACT:DEGRADED\r
X-MAINTNOTE-STATUS:TENTATIVE\r
ORGANIZER;CN=\"Example NOC\":mailto:noone@example.com\r
END:VEVENT\r
END:VCALENDAR\r
";

    const SPARSE_EVENT: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
DTSTART;TZID=Europe/Paris:20180808T070000\r
DTEND;VALUE=DATE:20180809\r
X-MAINTNOTE-ACCOUNT:None\r
X-MAINTNOTE-OBJECT-ID:123\r
END:VEVENT\r
END:VCALENDAR\r
";

    const OUTLOOK_EVENT: &str = "BEGIN:VCALENDAR\r
METHOD:REQUEST\r
PRODID:Microsoft Exchange Server 2010\r
VERSION:2.0\r
BEGIN:VTIMEZONE\r
TZID:W. Europe Standard Time\r
BEGIN:STANDARD\r
DTSTART:16010101T030000\r
TZOFFSETFROM:+0200\r
TZOFFSETTO:+0100\r
RRULE:FREQ=YEARLY;INTERVAL=1;BYDAY=-1SU;BYMONTH=10\r
END:STANDARD\r
BEGIN:DAYLIGHT\r
DTSTART:16010101T020000\r
TZOFFSETFROM:+0100\r
TZOFFSETTO:+0200\r
RRULE:FREQ=YEARLY;INTERVAL=1;BYDAY=-1SU;BYMONTH=3\r
END:DAYLIGHT\r
END:VTIMEZONE\r
BEGIN:VEVENT\r
DTSTART;TZID=W. Europe Standard Time:20180808T070000\r
DTEND;TZID=W. Europe Standard Time:20181210T070000\r
X-MAINTNOTE-OBJECT-ID:123\r
END:VEVENT\r
END:VCALENDAR\r
";

    #[test]
    fn test_maintnote_example() {
        let records = ICal::new().parse(MAINTNOTE_EXAMPLE.as_bytes(), "ical").unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record["provider"], "example.com");
        assert_eq!(record["account"], "137.035999173");
        assert_eq!(record["maintenance_id"], "WorkOrder-31415");
        assert_eq!(record["status"], "TENTATIVE");
        assert_eq!(record["start"], 1444464000);
        assert_eq!(record["end"], 1444471200);
        assert_eq!(record["stamp"], 1444435800);
        assert_eq!(record["summary"], "Maint Note Example, with escapes");
        assert_eq!(record["organizer"], "mailto:noone@example.com");
        assert_eq!(record["uid"], "42");
        assert_eq!(record["sequence"], 1);
        assert_eq!(
            record["circuits"],
            json!([
                {"circuit_id": "acme-widgets-as-a-service", "impact": "NO-IMPACT"},
                {"circuit_id": "acme-widgets-as-a-service-2", "impact": "DEGRADED"},
            ])
        );
    }

    #[test]
    fn test_defaults_and_dropped_values() {
        let records = ICal::new().parse(SPARSE_EVENT.as_bytes(), "text/calendar").unwrap();
        let record = &records[0];

        assert_eq!(record["status"], "NO-CHANGE");
        assert_eq!(record["sequence"], UNSEQUENCED);
        assert!(!record.contains_key("account"));
        assert!(!record.contains_key("provider"));
        assert_eq!(record["circuits"], json!([{"circuit_id": "123"}]));
    }

    #[test]
    fn test_timezone_and_date_values() {
        let records = ICal::new().parse(SPARSE_EVENT.as_bytes(), "ical").unwrap();
        let record = &records[0];

        // 07:00 CEST
        assert_eq!(record["start"], 1533704400);
        // midnight UTC
        assert_eq!(record["end"], 1533772800);
        assert!(!record.contains_key("stamp"));
    }

    #[test]
    fn test_base64_payload() {
        let encoded = STANDARD.encode(MAINTNOTE_EXAMPLE);
        let records = ICal::new().parse(encoded.as_bytes(), "ical").unwrap();
        assert_eq!(records[0]["maintenance_id"], "WorkOrder-31415");
    }

    #[test]
    fn test_not_a_calendar() {
        let err = ICal::new().parse(b"just some text", "ical").unwrap_err();
        assert!(err.to_string().contains("Not a valid iCalendar data received"));
    }

    #[test]
    fn test_invalid_timestamp_fails() {
        let broken = MAINTNOTE_EXAMPLE.replace("20151010T080000Z", "tomorrow");
        let err = ICal::new().parse(broken.as_bytes(), "ical").unwrap_err();
        assert!(err.to_string().contains("DTSTART"));
    }

    #[test]
    fn test_calendar_defined_timezone() {
        let records = ICal::new().parse(OUTLOOK_EVENT.as_bytes(), "ical").unwrap();
        let record = &records[0];

        // 07:00 under DAYLIGHT (+0200), then 07:00 under STANDARD (+0100)
        assert_eq!(record["start"], 1533704400);
        assert_eq!(record["end"], 1544421600);
    }

    #[test]
    fn test_calendar_zone_wins_over_zone_name() {
        let custom = OUTLOOK_EVENT
            .replace("TZOFFSETTO:+0200", "TZOFFSETTO:+0500")
            .replace("W. Europe Standard Time", "Customer Time");
        let records = ICal::new().parse(custom.as_bytes(), "ical").unwrap();
        assert_eq!(records[0]["start"], 1533704400 - 3 * 3600);
    }

    #[test]
    fn test_windows_tzid_without_definition() {
        let outlook = SPARSE_EVENT.replace("Europe/Paris", "Romance Standard Time");
        let records = ICal::new().parse(outlook.as_bytes(), "ical").unwrap();
        assert_eq!(records[0]["start"], 1533704400);
    }

    #[test]
    fn test_zone_rules() {
        let rule = parse_yearly_rule("FREQ=YEARLY;BYDAY=-1SU;BYMONTH=10").unwrap();
        assert_eq!(rule.date_in(2018), NaiveDate::from_ymd_opt(2018, 10, 28));

        let rule = parse_yearly_rule("FREQ=YEARLY;BYMONTH=3;BYDAY=2SU").unwrap();
        assert_eq!(rule.date_in(2018), NaiveDate::from_ymd_opt(2018, 3, 11));

        assert!(parse_yearly_rule("FREQ=MONTHLY;BYDAY=1SU;BYMONTH=3").is_none());
        assert_eq!(parse_utc_offset("-0500"), Some(-5 * 3600));
        assert_eq!(parse_utc_offset("+053000"), Some(5 * 3600 + 30 * 60));
        assert_eq!(parse_utc_offset("0100"), None);
    }

    #[test]
    fn test_unknown_tzid_fails() {
        let broken = SPARSE_EVENT.replace("Europe/Paris", "Mars/Olympus");
        assert!(ICal::new().parse(broken.as_bytes(), "ical").is_err());
    }

    #[test]
    fn test_calendar_without_events() {
        let empty = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n";
        assert!(ICal::new().parse(empty.as_bytes(), "ical").unwrap().is_empty());
    }
}
