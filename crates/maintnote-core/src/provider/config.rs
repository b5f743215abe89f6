//! Provider profiles from YAML.
//!
//! ```yaml
//! providers:
//!   - name: arelion
//!     default_organizer: support@arelion.com
//!     processors:
//!       - kind: simple
//!         parsers: [ical]
//!     exclude_filter:
//!       email-header-subject: ["Disturbance Information"]
//! ```
//!
//! Loading runs three checks in order: the JSON schema, semantic validation
//! (unique names, compilable filters), and parser resolution against a
//! [`ParserCatalog`] when the providers are built.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::filter::DataFilter;
use super::schema::validate_profiles_schema;
use super::Provider;
use crate::parsers::ParserCatalog;
use crate::processor::{Processor, ProcessorKind};

/// Errors loading provider profiles.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read profiles file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse profiles: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Profiles do not match the schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Invalid profile '{provider}': {reason}")]
    Invalid { provider: String, reason: String },
}

/// One processor of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessorDefinition {
    /// Combination discipline
    pub kind: ProcessorKind,

    /// Parser names, resolved through the catalog
    pub parsers: Vec<String>,
}

/// One provider profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderDefinition {
    /// Provider type, matched case-insensitively
    pub name: String,

    /// Sender address, also the fallback organizer
    pub default_organizer: String,

    /// Fallback `provider` value (defaults to `name`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Fallback chain, tried in order
    pub processors: Vec<ProcessorDefinition>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub include_filter: BTreeMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exclude_filter: BTreeMap<String, Vec<String>>,
}

impl ProviderDefinition {
    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            provider: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn filters(&self) -> Result<(DataFilter, DataFilter), ConfigError> {
        let include = DataFilter::from_patterns(&self.include_filter)
            .map_err(|e| self.invalid(format!("include_filter: {}", e)))?;
        let exclude = DataFilter::from_patterns(&self.exclude_filter)
            .map_err(|e| self.invalid(format!("exclude_filter: {}", e)))?;
        Ok((include, exclude))
    }

    /// Build the provider, resolving parser names through `catalog`.
    pub fn build(&self, catalog: &ParserCatalog) -> Result<Provider, ConfigError> {
        let processors = self
            .processors
            .iter()
            .map(|definition| {
                let parsers = definition
                    .parsers
                    .iter()
                    .map(|name| {
                        catalog.get(name).ok_or_else(|| {
                            self.invalid(format!(
                                "unknown parser '{}'. Available: {:?}",
                                name,
                                catalog.names()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Processor::new(definition.kind, parsers))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let (include, exclude) = self.filters()?;
        let mut provider = Provider::new(&self.name, &self.default_organizer, processors)
            .with_include_filter(include)
            .with_exclude_filter(exclude);
        if let Some(default_provider) = &self.provider {
            provider = provider.with_default_provider(default_provider);
        }
        Ok(provider)
    }
}

/// A set of provider profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesConfig {
    pub providers: Vec<ProviderDefinition>,
}

impl ProfilesConfig {
    /// Parse and validate profiles from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        validate_profiles_schema(&value).map_err(ConfigError::Schema)?;

        let config: ProfilesConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate profiles from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();

        for definition in &self.providers {
            if !names.insert(definition.name.to_lowercase()) {
                return Err(definition.invalid("duplicate provider name"));
            }
            if definition.processors.is_empty() {
                return Err(definition.invalid("at least one processor is required"));
            }
            if let Some(index) = definition.processors.iter().position(|p| p.parsers.is_empty()) {
                return Err(definition.invalid(format!("processor {} has no parsers", index)));
            }
            definition.filters()?;
        }

        Ok(())
    }

    /// Build every provider, in declared order.
    pub fn build(&self, catalog: &ParserCatalog) -> Result<Vec<Provider>, ConfigError> {
        self.providers
            .iter()
            .map(|definition| definition.build(catalog))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: &str = r#"
providers:
  - name: acme
    default_organizer: noc@acme.example
    provider: ACME Networks
    processors:
      - kind: simple
        parsers: [ical]
      - kind: combined
        parsers: [email-date, ical]
    include_filter:
      email-header-subject: ["Maintenance"]
  - name: other
    default_organizer: support@other.example
    processors:
      - kind: simple
        parsers: [ical]
"#;

    #[test]
    fn test_parse_profiles() {
        let config = ProfilesConfig::from_yaml(PROFILES).unwrap();
        assert_eq!(config.providers.len(), 2);

        let acme = &config.providers[0];
        assert_eq!(acme.provider.as_deref(), Some("ACME Networks"));
        assert_eq!(acme.processors[1].kind, ProcessorKind::Combined);
        assert_eq!(acme.processors[1].parsers, vec!["email-date", "ical"]);
        assert!(acme.exclude_filter.is_empty());
    }

    #[test]
    fn test_build_providers() {
        let config = ProfilesConfig::from_yaml(PROFILES).unwrap();
        let providers = config.build(&ParserCatalog::new()).unwrap();

        assert_eq!(providers[0].name(), "acme");
        assert_eq!(providers[0].default_provider(), "ACME Networks");
        assert_eq!(providers[0].processors().len(), 2);
        assert_eq!(providers[1].default_provider(), "other");
    }

    #[test]
    fn test_unknown_parser_fails_build() {
        let yaml = PROFILES.replace("[email-date, ical]", "[email-date, acme-html]");
        let config = ProfilesConfig::from_yaml(&yaml).unwrap();

        let err = config.build(&ParserCatalog::new()).unwrap_err();
        assert!(err.to_string().contains("unknown parser 'acme-html'"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = PROFILES.replace("name: other", "name: acme");
        let err = ProfilesConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("duplicate provider name"));
    }

    #[test]
    fn test_bad_filter_regex_rejected() {
        let yaml = PROFILES.replace("[\"Maintenance\"]", "[\"(\"]");
        let err = ProfilesConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("include_filter"));
    }

    #[test]
    fn test_schema_violation_reported() {
        let yaml = PROFILES.replace("kind: simple", "kind: parallel");
        let err = ProfilesConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Schema(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ProfilesConfig::from_yaml("providers: [").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
