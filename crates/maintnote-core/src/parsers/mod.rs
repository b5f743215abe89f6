//! Parsers: format-specific extraction rules.
//!
//! A parser declares the data types (fragment tags) it accepts and turns the
//! content of one matching fragment into zero or more partial records. Partial
//! records are loosely typed; they only become a [`Maintenance`] once a
//! processor has merged and validated them.
//!
//! Concrete parsers only implement [`Parser::parse_data`]. The provided
//! [`Parser::parse`] wraps every hook failure into a [`ParserError`] and rejects
//! empty records, so a rule that found nothing useful can simply return an
//! empty map.
//!
//! Shared format capabilities live in the submodules:
//!
//! | Module | Capability |
//! |--------|------------|
//! | [`ical`] | calendar events, MAINTNOTE properties |
//! | [`html`] | HTML tree access and cell cleanup |
//! | [`text`] | decoded, normalized text |
//! | [`email`] | Subject and Date header rules |
//! | [`llm`] | extraction through an injected LLM backend |
//!
//! [`Maintenance`]: crate::output::Maintenance

pub mod email;
pub mod html;
pub mod ical;
pub mod llm;
pub mod patterns;
pub mod text;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub use email::{EmailDateParser, EmailSubjectParser};
pub use ical::ICal;
pub use llm::{LlmBackend, LlmParser};

/// A loosely-typed, possibly incomplete maintenance record.
pub type PartialRecord = serde_json::Map<String, Value>;

/// Error type returned by parser hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Extraction failed for one fragment.
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Parser {parser} failed on {data_type} data: {source}")]
    Extraction {
        parser: String,
        data_type: String,
        #[source]
        source: BoxError,
    },

    #[error("Parser {parser} returned an empty record for {data_type} data")]
    EmptyRecord { parser: String, data_type: String },
}

/// An extraction rule.
pub trait Parser: Send + Sync {
    /// Name used in profiles, error messages and record metadata.
    fn name(&self) -> &str;

    /// Fragment tags this parser accepts.
    fn data_types(&self) -> &[&str];

    /// Rule-specific extraction hook.
    fn parse_data(&self, content: &[u8], data_type: &str) -> Result<Vec<PartialRecord>, BoxError>;

    /// Whether records from this parser were produced by a language model.
    fn uses_llm(&self) -> bool {
        false
    }

    fn accepts(&self, data_type: &str) -> bool {
        self.data_types().contains(&data_type)
    }

    /// Run the hook with uniform failure signaling.
    fn parse(&self, content: &[u8], data_type: &str) -> Result<Vec<PartialRecord>, ParserError> {
        let records = self
            .parse_data(content, data_type)
            .map_err(|source| ParserError::Extraction {
                parser: self.name().to_string(),
                data_type: data_type.to_string(),
                source,
            })?;

        if records.iter().any(|record| record.is_empty()) {
            return Err(ParserError::EmptyRecord {
                parser: self.name().to_string(),
                data_type: data_type.to_string(),
            });
        }

        Ok(records)
    }
}

impl fmt::Debug for dyn Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("name", &self.name())
            .field("data_types", &self.data_types())
            .finish()
    }
}

/// A parser backed by a plain function or closure.
///
/// This is how provider-specific rules are usually written:
///
/// ```
/// use maintnote_core::parsers::{FnParser, Parser, PartialRecord};
///
/// let parser = FnParser::new("acme-text", &["text/plain"], |content, _| {
///     let mut record = PartialRecord::new();
///     if content.starts_with(b"ACME") {
///         record.insert("account".into(), "acme".into());
///     }
///     Ok(vec![record])
/// });
/// assert_eq!(parser.parse(b"ACME notice", "text/plain").unwrap().len(), 1);
/// assert!(parser.parse(b"other", "text/plain").is_err());
/// ```
pub struct FnParser<F> {
    name: String,
    data_types: &'static [&'static str],
    hook: F,
}

impl<F> FnParser<F>
where
    F: Fn(&[u8], &str) -> Result<Vec<PartialRecord>, BoxError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, data_types: &'static [&'static str], hook: F) -> Self {
        Self {
            name: name.into(),
            data_types,
            hook,
        }
    }
}

impl<F> Parser for FnParser<F>
where
    F: Fn(&[u8], &str) -> Result<Vec<PartialRecord>, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn data_types(&self) -> &[&str] {
        self.data_types
    }

    fn parse_data(&self, content: &[u8], data_type: &str) -> Result<Vec<PartialRecord>, BoxError> {
        (self.hook)(content, data_type)
    }
}

/// Parsers addressable by name from provider profiles.
#[derive(Clone)]
pub struct ParserCatalog {
    parsers: BTreeMap<String, Arc<dyn Parser>>,
}

impl ParserCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// A catalog holding the built-in parsers (`ical`, `email-date`).
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        catalog.register(Arc::new(ICal::new()));
        catalog.register(Arc::new(EmailDateParser::new()));
        catalog
    }

    /// Add or replace a parser under its own name.
    pub fn register(&mut self, parser: Arc<dyn Parser>) -> &mut Self {
        self.parsers.insert(parser.name().to_string(), parser);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Parser>> {
        self.parsers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parsers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.parsers.keys().map(String::as_str).collect()
    }
}

impl Default for ParserCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParserCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserCatalog")
            .field("parsers", &self.names())
            .finish()
    }
}
