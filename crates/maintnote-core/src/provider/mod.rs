//! Providers: named notification sources with a processor fallback chain.
//!
//! A provider tries its processors in declared order and returns the output of
//! the first one that succeeds, even when that output is empty. Failed
//! processors are only visible in debug logs unless every processor fails, in
//! which case a [`ProviderError`] lists each of them.

pub mod config;
mod filter;
pub mod registry;
mod schema;

use std::sync::Arc;

use thiserror::Error;

use crate::data::NotificationData;
use crate::output::Maintenance;
use crate::parsers::{EmailDateParser, ICal, LlmBackend, LlmParser};
use crate::processor::{ExtendedData, Processor, ProcessorError};

pub use config::{ConfigError, ProcessorDefinition, ProfilesConfig, ProviderDefinition};
pub use filter::DataFilter;
pub use registry::{registry, ProfileOverrides, ProviderRegistry, RegistryError};
pub use schema::validate_profiles_schema;

/// Name of the catch-all provider.
pub const GENERIC_PROVIDER: &str = "genericprovider";

/// Organizer used when neither the notification nor the profile knows one.
pub const UNKNOWN_ORGANIZER: &str = "unknown";

/// Every processor of a provider failed.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider type that failed
    pub provider: String,

    /// Human-readable summary of every processor failure
    pub message: String,

    /// The processor failures, in the order they were tried
    pub related_errors: Vec<ProcessorError>,
}

impl ProviderError {
    fn new(provider: &str, related_errors: Vec<ProcessorError>) -> Self {
        let mut message = format!(
            "Failed creating Maintenance notification for {}.\nDetails:\n",
            provider
        );
        for err in &related_errors {
            let cause = std::error::Error::source(err)
                .map(|source| source.to_string())
                .unwrap_or_else(|| err.to_string());
            message.push_str(&format!(
                "- Processor {} from {} failed due to: {}\n",
                err.processor(),
                provider,
                cause
            ));
        }

        Self {
            provider: provider.to_string(),
            message,
            related_errors,
        }
    }
}

/// A notification source and how to read its notifications.
#[derive(Debug, Clone)]
pub struct Provider {
    name: String,
    default_organizer: String,
    default_provider: String,
    processors: Vec<Processor>,
    include_filter: DataFilter,
    exclude_filter: DataFilter,
}

impl Provider {
    /// A provider whose default `provider` value is its own name.
    pub fn new(
        name: impl Into<String>,
        default_organizer: impl Into<String>,
        processors: Vec<Processor>,
    ) -> Self {
        let name = name.into();
        Self {
            default_provider: name.clone(),
            name,
            default_organizer: default_organizer.into(),
            processors,
            include_filter: DataFilter::new(),
            exclude_filter: DataFilter::new(),
        }
    }

    /// The catch-all provider: standard calendar notifications only.
    pub fn generic() -> Self {
        Self::new(
            GENERIC_PROVIDER,
            UNKNOWN_ORGANIZER,
            vec![Processor::simple(vec![Arc::new(ICal::new())])],
        )
    }

    pub fn with_default_organizer(mut self, organizer: impl Into<String>) -> Self {
        self.default_organizer = organizer.into();
        self
    }

    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    /// Only process notifications matching `filter`.
    pub fn with_include_filter(mut self, filter: DataFilter) -> Self {
        self.include_filter = filter;
        self
    }

    /// Skip notifications matching `filter`. Wins over the include filter.
    pub fn with_exclude_filter(mut self, filter: DataFilter) -> Self {
        self.exclude_filter = filter;
        self
    }

    /// Append a processor to the end of the fallback chain.
    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processors.push(processor);
        self
    }

    /// Append a last-resort processor that asks `backend` about the
    /// notification body and takes `stamp` from the email Date header.
    pub fn with_llm_fallback(self, backend: Arc<dyn LlmBackend>) -> Self {
        self.with_processor(Processor::combined(vec![
            Arc::new(EmailDateParser::new()),
            Arc::new(LlmParser::new(backend)),
        ]))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_organizer(&self) -> &str {
        &self.default_organizer
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    /// Every fragment tag some processor can read.
    pub fn data_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for data_type in self.processors.iter().flat_map(Processor::data_types) {
            if !types.contains(&data_type) {
                types.push(data_type);
            }
        }
        types
    }

    /// Defaults handed to every processor.
    pub fn extended_data(&self) -> ExtendedData {
        ExtendedData::new(&self.name, &self.default_organizer, &self.default_provider)
    }

    fn filtered_out(&self, data: &NotificationData) -> bool {
        let excluded = !self.exclude_filter.is_empty() && self.exclude_filter.matches(data, "exclude");
        let included = self.include_filter.is_empty() || self.include_filter.matches(data, "include");
        excluded || !included
    }

    /// Extract every maintenance in `data`.
    pub fn get_maintenances(&self, data: &NotificationData) -> Result<Vec<Maintenance>, ProviderError> {
        if self.filtered_out(data) {
            tracing::debug!(provider = %self.name, "Skipping notification due to filtering policy");
            return Ok(Vec::new());
        }

        let extended = self.extended_data();
        let mut related_errors = Vec::new();

        for processor in &self.processors {
            match processor.process(data, &extended) {
                Ok(maintenances) => {
                    tracing::debug!(
                        provider = %self.name,
                        processor = %processor.name(),
                        count = maintenances.len(),
                        "Processor succeeded"
                    );
                    return Ok(maintenances);
                }
                Err(e) => {
                    tracing::debug!(
                        provider = %self.name,
                        processor = %processor.name(),
                        error = %e,
                        cause = ?std::error::Error::source(&e),
                        "Processor failed, trying next"
                    );
                    related_errors.push(e);
                }
            }
        }

        Err(ProviderError::new(&self.name, related_errors))
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::generic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EMAIL_HEADER_SUBJECT;
    use crate::parsers::{FnParser, Parser, PartialRecord};
    use serde_json::{json, Value};

    const ICAL: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
DTSTART:20180808T050000Z\r
DTEND:20180808T071300Z\r
DTSTAMP:20180806T224928Z\r
X-MAINTNOTE-ACCOUNT:12345000\r
X-MAINTNOTE-MAINTENANCE-ID:VNOC-1-1\r
X-MAINTNOTE-OBJECT-ID:123\r
X-MAINTNOTE-IMPACT:OUTAGE\r
END:VEVENT\r
END:VCALENDAR\r
";

    fn always(name: &str, data_types: &'static [&'static str], result: Option<Value>) -> Arc<dyn Parser> {
        Arc::new(FnParser::new(name, data_types, move |_, _| match &result {
            Some(Value::Object(map)) => Ok(vec![map.clone()]),
            _ => Err("no luck".into()),
        }))
    }

    fn complete() -> Value {
        json!({
            "account": "1",
            "maintenance_id": "M-1",
            "circuits": [{"circuit_id": "c"}],
            "status": "CONFIRMED",
            "start": 1,
            "end": 2,
            "stamp": 0,
        })
    }

    #[test]
    fn test_generic_provider_reads_ical() {
        let data = NotificationData::init_from_raw("ical", ICAL.as_bytes().to_vec());
        let maintenances = Provider::generic().get_maintenances(&data).unwrap();

        assert_eq!(maintenances.len(), 1);
        let maintenance = &maintenances[0];
        assert_eq!(maintenance.provider(), GENERIC_PROVIDER);
        assert_eq!(maintenance.organizer(), UNKNOWN_ORGANIZER);
        assert_eq!(maintenance.sequence(), -1);
        assert_eq!(maintenance.metadata().provider, GENERIC_PROVIDER);
    }

    #[test]
    fn test_fallback_uses_second_processor() {
        let provider = Provider::new(
            "acme",
            "noc@acme.example",
            vec![
                Processor::simple(vec![always("first", &["text/plain"], None)]),
                Processor::simple(vec![always("second", &["text/plain"], Some(complete()))]),
            ],
        );
        let data = NotificationData::init_from_raw("text/plain", b"notice".to_vec());

        let maintenances = provider.get_maintenances(&data).unwrap();
        assert_eq!(maintenances.len(), 1);
        assert_eq!(maintenances[0].metadata().parsers, vec!["second"]);
        assert_eq!(maintenances[0].organizer(), "noc@acme.example");
    }

    #[test]
    fn test_first_success_wins_even_when_empty() {
        let empty: Arc<dyn Parser> =
            Arc::new(FnParser::new("empty", &["text/plain"], |_, _| Ok(Vec::<PartialRecord>::new())));
        let provider = Provider::new(
            "acme",
            "noc@acme.example",
            vec![
                Processor::simple(vec![empty]),
                Processor::simple(vec![always("second", &["text/plain"], Some(complete()))]),
            ],
        );
        let data = NotificationData::init_from_raw("text/plain", b"notice".to_vec());
        assert!(provider.get_maintenances(&data).unwrap().is_empty());
    }

    #[test]
    fn test_all_processors_fail() {
        let provider = Provider::new(
            "acme",
            "noc@acme.example",
            vec![
                Processor::simple(vec![always("first", &["text/plain"], None)]),
                Processor::combined(vec![always("second", &["text/html"], None)]),
            ],
        );
        let data = NotificationData::init_from_raw("text/plain", b"notice".to_vec());

        let err = provider.get_maintenances(&data).unwrap_err();
        assert_eq!(err.related_errors.len(), 2);
        assert!(err
            .to_string()
            .starts_with("Failed creating Maintenance notification for acme.\nDetails:\n"));
        assert!(err
            .to_string()
            .contains("- Processor SimpleProcessor from acme failed due to: Parser first failed"));
        assert!(err
            .to_string()
            .contains("- Processor CombinedProcessor from acme failed due to: None of the supported parsers"));
    }

    #[test]
    fn test_exclude_filter_skips_notification() {
        let provider = Provider::generic()
            .with_exclude_filter(
                DataFilter::new()
                    .with_pattern(EMAIL_HEADER_SUBJECT, "Disturbance Information")
                    .unwrap(),
            )
            .with_include_filter(DataFilter::new().with_pattern(EMAIL_HEADER_SUBJECT, ".*").unwrap());

        let mut data = NotificationData::init_from_raw("ical", b"not even a calendar".to_vec());
        data.append(EMAIL_HEADER_SUBJECT, b"Disturbance Information: fiber cut".to_vec());

        assert!(provider.get_maintenances(&data).unwrap().is_empty());
    }

    #[test]
    fn test_include_filter_requires_match() {
        let provider = Provider::generic()
            .with_include_filter(DataFilter::new().with_pattern(EMAIL_HEADER_SUBJECT, "Planned").unwrap());

        let mut data = NotificationData::init_from_raw("ical", ICAL.as_bytes().to_vec());
        data.append(EMAIL_HEADER_SUBJECT, b"Planned work VNOC-1-1".to_vec());
        assert_eq!(provider.get_maintenances(&data).unwrap().len(), 1);

        let mut data = NotificationData::init_from_raw("ical", ICAL.as_bytes().to_vec());
        data.append(EMAIL_HEADER_SUBJECT, b"Outage report".to_vec());
        assert!(provider.get_maintenances(&data).unwrap().is_empty());
    }

    #[test]
    fn test_default_provider_override() {
        let provider = Provider::generic()
            .with_default_provider("Example Networks")
            .with_default_organizer("noc@example.net");
        let data = NotificationData::init_from_raw("ical", ICAL.as_bytes().to_vec());

        let maintenance = &provider.get_maintenances(&data).unwrap()[0];
        assert_eq!(maintenance.provider(), "Example Networks");
        assert_eq!(maintenance.organizer(), "noc@example.net");
        assert_eq!(maintenance.slug(), "example");
        assert_eq!(maintenance.metadata().provider, GENERIC_PROVIDER);
    }

    #[test]
    fn test_data_types() {
        let provider = Provider::generic().with_processor(Processor::combined(vec![
            Arc::new(EmailDateParser::new()),
            Arc::new(ICal::new()),
        ]));
        assert_eq!(
            provider.data_types(),
            vec!["ical", "text/calendar", crate::data::EMAIL_HEADER_DATE]
        );
    }
}
