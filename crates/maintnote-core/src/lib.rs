//! # maintnote-core
//!
//! Turns circuit-maintenance notifications from network service providers into
//! validated, normalized maintenance records.
//!
//! A notification is first split into tagged fragments ([`NotificationData`]).
//! A [`Provider`] then tries its processors in order; each [`Processor`] runs
//! the parsers accepting the fragments' tags, combines their partial records
//! and validates the result into [`Maintenance`] records.
//!
//! ## Example
//!
//! ```rust,ignore
//! use maintnote_core::{get_source_profile, init_data_from_email};
//!
//! let data = init_data_from_email(&std::fs::read("notification.eml")?)?;
//! let provider = get_source_profile("noc@eunetworks.com")?;
//!
//! for maintenance in provider.get_maintenances(&data)? {
//!     println!("{}", maintenance.to_json()?);
//! }
//! ```
//!
//! Providers are declared in YAML profiles (see [`provider::config`]); the
//! built-in set is available through [`provider::registry`].

pub mod data;
pub mod output;
pub mod parsers;
pub mod processor;
pub mod provider;
pub mod timezone;

// Re-export main types at crate root
pub use data::{DataError, DataPart, NotificationData, EMAIL_HEADER_DATE, EMAIL_HEADER_SUBJECT};
pub use output::{
    CircuitImpact, Impact, Maintenance, MaintenanceJsonError, Metadata, Status, ValidationError,
    Violation,
};
pub use parsers::{Parser, ParserCatalog, ParserError, PartialRecord};
pub use processor::{ExtendedData, Processor, ProcessorError, ProcessorKind};
pub use provider::{
    registry, ProfileOverrides, Provider, ProviderError, ProviderRegistry, RegistryError,
    GENERIC_PROVIDER,
};
pub use timezone::{StaticTimezoneResolver, TimezoneError, TimezoneResolver};

/// A notification made of a single fragment.
pub fn init_data(data_type: &str, content: impl Into<Vec<u8>>) -> NotificationData {
    NotificationData::init_from_raw(data_type, content)
}

/// A notification decomposed from a raw RFC 5322 email.
pub fn init_data_from_email(raw_email: &[u8]) -> Result<NotificationData, DataError> {
    NotificationData::init_from_email(raw_email)
}

/// The built-in provider named `name_or_sender`, or whose sender it is.
///
/// An empty string selects the generic provider.
pub fn get_source_profile(name_or_sender: &str) -> Result<Provider, RegistryError> {
    let key = if name_or_sender.is_empty() {
        GENERIC_PROVIDER
    } else {
        name_or_sender
    };
    registry()?.lookup(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTIFICATION: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//Maint Note//https://github.com/maint-notification//\r
BEGIN:VEVENT\r
SUMMARY:Maint Note Example\r
DTSTART:20180808T050000Z\r
DTEND:20180808T071300Z\r
DTSTAMP:20180806T224928Z\r
UID:42\r
ORGANIZER:a@example.com\r
X-MAINTNOTE-PROVIDER:X\r
X-MAINTNOTE-ACCOUNT:12345000\r
X-MAINTNOTE-MAINTENANCE-ID:VNOC-1-1\r
X-MAINTNOTE-OBJECT-ID:123\r
X-MAINTNOTE-IMPACT:OUTAGE\r
END:VEVENT\r
END:VCALENDAR\r
";

    #[test]
    fn test_calendar_notification_end_to_end() {
        let data = init_data("ical", NOTIFICATION);
        let provider = get_source_profile("").unwrap();

        let maintenances = provider.get_maintenances(&data).unwrap();
        assert_eq!(maintenances.len(), 1);

        let maintenance = &maintenances[0];
        assert_eq!(maintenance.provider(), "X");
        assert_eq!(maintenance.account(), "12345000");
        assert_eq!(maintenance.maintenance_id(), "VNOC-1-1");
        assert_eq!(maintenance.status(), Status::Confirmed);
        assert_eq!(maintenance.start(), 1533704400);
        assert_eq!(maintenance.end(), 1533712380);
        assert_eq!(maintenance.stamp(), 1533595768);
        assert_eq!(maintenance.organizer(), "a@example.com");
        assert_eq!(maintenance.sequence(), -1);
        assert_eq!(maintenance.circuits(), &[CircuitImpact::outage("123").unwrap()]);
        assert_eq!(maintenance.metadata().parsers, vec!["ical"]);
        assert!(!maintenance.metadata().generated_by_llm);
    }

    #[test]
    fn test_missing_account_names_the_field() {
        let data = init_data("ical", NOTIFICATION.replace("X-MAINTNOTE-ACCOUNT:12345000\r\n", ""));
        let provider = get_source_profile(GENERIC_PROVIDER).unwrap();

        let err = provider.get_maintenances(&data).unwrap_err();
        assert_eq!(err.related_errors.len(), 1);
        match &err.related_errors[0] {
            ProcessorError::Validation { source, .. } => {
                assert_eq!(source.field, "account");
                assert_eq!(source.violation, Violation::Missing);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("account"));
    }

    #[test]
    fn test_email_notification_end_to_end() {
        let email = format!(
            "From: noc@eunetworks.com\r
Subject: Planned maintenance VNOC-1-1\r
Date: Mon, 06 Aug 2018 22:49:28 +0000\r
MIME-Version: 1.0\r
Content-Type: multipart/mixed; boundary=\"b1\"\r
\r
--b1\r
Content-Type: text/plain\r
\r
Please find the maintenance attached.\r
--b1\r
Content-Type: text/calendar\r
\r
{}--b1--\r
",
            NOTIFICATION
        );
        let data = init_data_from_email(email.as_bytes()).unwrap();
        let provider = get_source_profile("noc@eunetworks.com").unwrap();
        assert_eq!(provider.name(), "eunetworks");

        let maintenances = provider.get_maintenances(&data).unwrap();
        assert_eq!(maintenances.len(), 1);
        assert_eq!(maintenances[0].maintenance_id(), "VNOC-1-1");
    }

    #[test]
    fn test_unknown_profile() {
        let err = get_source_profile("acme").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownProvider { .. }));
    }
}
