//! Processors: turning parser output into maintenances.
//!
//! A processor owns an ordered list of parsers and one of two combination
//! disciplines:
//!
//! - [`ProcessorKind::Simple`]: every record any parser returns is a complete
//!   maintenance on its own.
//! - [`ProcessorKind::Combined`]: each parser contributes exactly one partial
//!   record; all contributions are merged in parser order (later keys win) and
//!   validated once.
//!
//! Parsers are matched to fragments rule-major: for each parser in configured
//! order, every fragment whose tag it accepts, in collection order.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::data::{DataPart, NotificationData};
use crate::output::{Maintenance, Metadata, Status, ValidationError};
use crate::parsers::{Parser, ParserError, PartialRecord};

/// Errors from one processor run.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("None of the supported parsers for processor {processor} ({parsers}) was matching any of the provided data types ({data_types}).")]
    NoMatchingParsers {
        processor: String,
        parsers: String,
        data_types: String,
    },

    #[error("Parser {parser} from {processor} was not successful: {source}")]
    Parser {
        processor: String,
        parser: String,
        #[source]
        source: ParserError,
    },

    #[error("Unexpected data retrieved from parser {parser} in {processor}: expected one record, got {count}")]
    UnexpectedData {
        processor: String,
        parser: String,
        count: usize,
    },

    #[error("Not enough information available to create a Maintenance notification ({processor} with {}): {source}", .parsers.join(", "))]
    Validation {
        processor: String,
        parsers: Vec<String>,
        #[source]
        source: ValidationError,
    },
}

impl ProcessorError {
    /// Name of the processor that failed.
    pub fn processor(&self) -> &str {
        match self {
            ProcessorError::NoMatchingParsers { processor, .. }
            | ProcessorError::Parser { processor, .. }
            | ProcessorError::UnexpectedData { processor, .. }
            | ProcessorError::Validation { processor, .. } => processor,
        }
    }
}

/// Combination discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    Simple,
    Combined,
}

impl ProcessorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessorKind::Simple => "SimpleProcessor",
            ProcessorKind::Combined => "CombinedProcessor",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Defaults filled into records just before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedData {
    /// Name of the source profile, reported in record metadata
    pub profile: String,

    /// Used when the record has no usable organizer
    pub organizer: String,

    /// Used when the record has no provider
    pub provider: String,
}

impl ExtendedData {
    pub fn new(
        profile: impl Into<String>,
        organizer: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            profile: profile.into(),
            organizer: organizer.into(),
            provider: provider.into(),
        }
    }

    /// Fill `organizer` when missing, empty or `"None"`, and `provider` when
    /// missing.
    pub fn extend(&self, record: &mut PartialRecord) {
        let organizer_usable = match record.get("organizer") {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty() && s != "None",
            Some(_) => true,
        };
        if !organizer_usable {
            record.insert("organizer".into(), Value::String(self.organizer.clone()));
        }

        if matches!(record.get("provider"), None | Some(Value::Null)) {
            record.insert("provider".into(), Value::String(self.provider.clone()));
        }
    }
}

/// An ordered parser list with a combination discipline.
#[derive(Clone)]
pub struct Processor {
    kind: ProcessorKind,
    parsers: Vec<Arc<dyn Parser>>,
}

impl Processor {
    pub fn new(kind: ProcessorKind, parsers: Vec<Arc<dyn Parser>>) -> Self {
        Self { kind, parsers }
    }

    pub fn simple(parsers: Vec<Arc<dyn Parser>>) -> Self {
        Self::new(ProcessorKind::Simple, parsers)
    }

    pub fn combined(parsers: Vec<Arc<dyn Parser>>) -> Self {
        Self::new(ProcessorKind::Combined, parsers)
    }

    pub fn kind(&self) -> ProcessorKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn parsers(&self) -> &[Arc<dyn Parser>] {
        &self.parsers
    }

    pub fn parser_names(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Fragment tags at least one parser accepts.
    pub fn data_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for data_type in self.parsers.iter().flat_map(|p| p.data_types().iter().copied()) {
            if !types.contains(&data_type) {
                types.push(data_type);
            }
        }
        types
    }

    /// Run every matching parser and build maintenances.
    pub fn process(
        &self,
        data: &NotificationData,
        extended: &ExtendedData,
    ) -> Result<Vec<Maintenance>, ProcessorError> {
        let matches = self.matching(data)?;

        match self.kind {
            ProcessorKind::Simple => self.process_simple(&matches, extended),
            ProcessorKind::Combined => self.process_combined(&matches, extended),
        }
    }

    fn matching<'a>(
        &'a self,
        data: &'a NotificationData,
    ) -> Result<Vec<(&'a Arc<dyn Parser>, &'a DataPart)>, ProcessorError> {
        let matches: Vec<_> = self
            .parsers
            .iter()
            .flat_map(|parser| {
                data.data_parts()
                    .filter(move |part| parser.accepts(&part.data_type))
                    .map(move |part| (parser, part))
            })
            .collect();

        if matches.is_empty() {
            let err = ProcessorError::NoMatchingParsers {
                processor: self.name().to_string(),
                parsers: self.parser_names().join(", "),
                data_types: data.data_types().join(", "),
            };
            tracing::debug!(processor = %self.name(), error = %err, "No parser matched");
            return Err(err);
        }

        Ok(matches)
    }

    fn run(&self, parser: &Arc<dyn Parser>, part: &DataPart) -> Result<Vec<PartialRecord>, ProcessorError> {
        parser.parse(&part.content, &part.data_type).map_err(|source| {
            tracing::debug!(
                processor = %self.name(),
                parser = %parser.name(),
                data_type = %part.data_type,
                error = %source,
                "Parser was not successful"
            );
            ProcessorError::Parser {
                processor: self.name().to_string(),
                parser: parser.name().to_string(),
                source,
            }
        })
    }

    fn process_simple(
        &self,
        matches: &[(&Arc<dyn Parser>, &DataPart)],
        extended: &ExtendedData,
    ) -> Result<Vec<Maintenance>, ProcessorError> {
        let mut maintenances = Vec::new();

        for (parser, part) in matches {
            for mut record in self.run(parser, part)? {
                extended.extend(&mut record);
                let maintenance = self.build(&record, &[*parser], extended)?;
                maintenances.push(maintenance);
            }
        }

        Ok(maintenances)
    }

    fn process_combined(
        &self,
        matches: &[(&Arc<dyn Parser>, &DataPart)],
        extended: &ExtendedData,
    ) -> Result<Vec<Maintenance>, ProcessorError> {
        let mut combined = PartialRecord::new();
        let mut contributors: Vec<&Arc<dyn Parser>> = Vec::new();

        for (parser, part) in matches {
            let [record]: [PartialRecord; 1] =
                self.run(parser, part)?
                    .try_into()
                    .map_err(|records: Vec<PartialRecord>| ProcessorError::UnexpectedData {
                        processor: self.name().to_string(),
                        parser: parser.name().to_string(),
                        count: records.len(),
                    })?;

            merge(&mut combined, record);
            if !contributors.iter().any(|c| c.name() == parser.name()) {
                contributors.push(*parser);
            }
        }

        extended.extend(&mut combined);
        Ok(vec![self.build(&combined, &contributors, extended)?])
    }

    fn build(
        &self,
        record: &PartialRecord,
        contributors: &[&Arc<dyn Parser>],
        extended: &ExtendedData,
    ) -> Result<Maintenance, ProcessorError> {
        let parsers: Vec<String> = contributors.iter().map(|p| p.name().to_string()).collect();

        let maintenance = Maintenance::from_record(record).map_err(|source| {
            tracing::debug!(processor = %self.name(), error = %source, "Record failed validation");
            ProcessorError::Validation {
                processor: self.name().to_string(),
                parsers: parsers.clone(),
                source,
            }
        })?;

        Ok(maintenance.with_metadata(Metadata {
            provider: extended.profile.clone(),
            processor: self.name().to_string(),
            generated_by_llm: contributors.iter().any(|p| p.uses_llm()),
            parsers,
        }))
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("kind", &self.kind)
            .field("parsers", &self.parser_names())
            .finish()
    }
}

/// Shallow merge, later keys win. A `NO-CHANGE` status never replaces a
/// status that is already there.
fn merge(combined: &mut PartialRecord, record: PartialRecord) {
    for (key, value) in record {
        let keeps_status = key == "status"
            && value.as_str() == Some(Status::NoChange.as_str())
            && combined.contains_key("status");
        if !keeps_status {
            combined.insert(key, value);
        }
    }
}
