//! Rules for the synthetic email header fragments.

use chrono::DateTime;
use serde_json::Value;

use super::{BoxError, Parser, PartialRecord};
use crate::data::{EMAIL_HEADER_DATE, EMAIL_HEADER_SUBJECT};

/// Turns the Date header into the record `stamp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailDateParser;

impl EmailDateParser {
    pub const NAME: &'static str = "email-date";

    pub fn new() -> Self {
        Self
    }
}

impl Parser for EmailDateParser {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn data_types(&self) -> &[&str] {
        &[EMAIL_HEADER_DATE]
    }

    fn parse_data(&self, content: &[u8], _data_type: &str) -> Result<Vec<PartialRecord>, BoxError> {
        let raw = String::from_utf8_lossy(content);
        let date = strip_comment(raw.trim());
        if date.is_empty() {
            return Err("No date available in the email header".into());
        }

        let parsed = DateTime::parse_from_rfc2822(date)
            .map_err(|e| format!("Invalid email date '{}': {}", date, e))?;

        let mut record = PartialRecord::new();
        record.insert("stamp".into(), Value::from(parsed.timestamp()));
        Ok(vec![record])
    }
}

/// `Mon, 6 Aug 2018 22:49:28 +0000 (UTC)` -> `Mon, 6 Aug 2018 22:49:28 +0000`
fn strip_comment(date: &str) -> &str {
    match date.find('(') {
        Some(at) if date.ends_with(')') => date[..at].trim_end(),
        _ => date,
    }
}

/// A subject rule written as a closure over the decoded, trimmed subject.
///
/// ```
/// use maintnote_core::parsers::{EmailSubjectParser, Parser, PartialRecord};
///
/// let parser = EmailSubjectParser::new("acme-subject", |subject| {
///     let mut record = PartialRecord::new();
///     if subject.contains("Cancelled") {
///         record.insert("status".into(), "CANCELLED".into());
///     }
///     Ok(vec![record])
/// });
/// let records = parser.parse(b"[Cancelled] Planned work", "email-header-subject").unwrap();
/// assert_eq!(records[0]["status"], "CANCELLED");
/// ```
pub struct EmailSubjectParser<F> {
    name: String,
    hook: F,
}

impl<F> EmailSubjectParser<F>
where
    F: Fn(&str) -> Result<Vec<PartialRecord>, BoxError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, hook: F) -> Self {
        Self {
            name: name.into(),
            hook,
        }
    }
}

impl<F> Parser for EmailSubjectParser<F>
where
    F: Fn(&str) -> Result<Vec<PartialRecord>, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn data_types(&self) -> &[&str] {
        &[EMAIL_HEADER_SUBJECT]
    }

    fn parse_data(&self, content: &[u8], _data_type: &str) -> Result<Vec<PartialRecord>, BoxError> {
        let subject = String::from_utf8_lossy(content);
        (self.hook)(subject.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ParserError;

    #[test]
    fn test_email_date() {
        let records = EmailDateParser::new()
            .parse(b"Mon, 6 Aug 2018 22:49:28 +0000", EMAIL_HEADER_DATE)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["stamp"], 1533595768);
    }

    #[test]
    fn test_email_date_with_offset_and_comment() {
        let records = EmailDateParser::new()
            .parse(b" Tue, 7 Aug 2018 00:49:28 +0200 (CEST) ", EMAIL_HEADER_DATE)
            .unwrap();
        assert_eq!(records[0]["stamp"], 1533595768);
    }

    #[test]
    fn test_email_date_missing_or_invalid() {
        let parser = EmailDateParser::new();
        assert!(matches!(
            parser.parse(b"", EMAIL_HEADER_DATE),
            Err(ParserError::Extraction { .. })
        ));
        assert!(parser.parse(b"yesterday", EMAIL_HEADER_DATE).is_err());
    }

    #[test]
    fn test_subject_parser_gets_trimmed_subject() {
        let parser = EmailSubjectParser::new("echo", |subject| {
            let mut record = PartialRecord::new();
            record.insert("summary".into(), subject.into());
            Ok(vec![record])
        });

        assert!(parser.accepts(EMAIL_HEADER_SUBJECT));
        let records = parser.parse(b"  Planned work VNOC-1 \r\n", EMAIL_HEADER_SUBJECT).unwrap();
        assert_eq!(records[0]["summary"], "Planned work VNOC-1");
    }

    #[test]
    fn test_subject_parser_nothing_found() {
        let parser = EmailSubjectParser::new("strict", |_| Ok(vec![PartialRecord::new()]));
        assert!(matches!(
            parser.parse(b"Hello", EMAIL_HEADER_SUBJECT),
            Err(ParserError::EmptyRecord { .. })
        ));
    }
}
