//! Provider lookup by name or sender address.

use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use super::config::{ConfigError, ProfilesConfig};
use super::{Provider, GENERIC_PROVIDER};
use crate::parsers::{LlmBackend, ParserCatalog};

/// Profiles shipped with the crate.
const BUILTIN_PROFILES: &str = include_str!("../../profiles/builtin.yaml");

static BUILTIN_REGISTRY: OnceLock<Result<ProviderRegistry, String>> = OnceLock::new();

/// Errors looking up providers.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{name} is not a currently supported provider. Only {} are supported.", .supported.join(", "))]
    UnknownProvider { name: String, supported: Vec<String> },

    #[error("{sender} is not a currently supported provider sender. Only {} are supported.", .supported.join(", "))]
    UnknownSender { sender: String, supported: Vec<String> },

    #[error("Failed to load provider profiles: {0}")]
    Config(#[from] ConfigError),

    #[error("Built-in provider profiles are unusable: {0}")]
    Builtin(String),
}

/// Caller-side adjustments applied by [`ProviderRegistry::instantiate`].
#[derive(Clone, Default)]
pub struct ProfileOverrides {
    pub default_organizer: Option<String>,
    pub default_provider: Option<String>,

    /// Appends an LLM fallback processor when set
    pub llm_backend: Option<Arc<dyn LlmBackend>>,
}

impl fmt::Debug for ProfileOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileOverrides")
            .field("default_organizer", &self.default_organizer)
            .field("default_provider", &self.default_provider)
            .field("llm_backend", &self.llm_backend.is_some())
            .finish()
    }
}

/// Known providers, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider, replacing any provider with the same name.
    pub fn register(&mut self, provider: Provider) -> &mut Self {
        let existing = self
            .providers
            .iter()
            .position(|p| p.name().eq_ignore_ascii_case(provider.name()));
        match existing {
            Some(index) => self.providers[index] = provider,
            None => self.providers.push(provider),
        }
        self
    }

    pub fn from_config(config: &ProfilesConfig, catalog: &ParserCatalog) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for provider in config.build(catalog)? {
            registry.register(provider);
        }
        Ok(registry)
    }

    pub fn from_yaml(yaml: &str, catalog: &ParserCatalog) -> Result<Self, RegistryError> {
        let config = ProfilesConfig::from_yaml(yaml)?;
        Self::from_config(&config, catalog)
    }

    /// The built-in profiles, resolved against the built-in parsers.
    pub fn with_defaults() -> Result<Self, RegistryError> {
        Self::from_yaml(BUILTIN_PROFILES, &ParserCatalog::new())
    }

    /// Case-insensitive match on the provider name.
    pub fn lookup_by_name(&self, name: &str) -> Result<&Provider, RegistryError> {
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| RegistryError::UnknownProvider {
                name: name.to_string(),
                supported: self.names().into_iter().map(String::from).collect(),
            })
    }

    /// Exact match on the default organizer address.
    pub fn lookup_by_sender(&self, sender: &str) -> Result<&Provider, RegistryError> {
        self.providers
            .iter()
            .find(|p| p.default_organizer() == sender)
            .ok_or_else(|| RegistryError::UnknownSender {
                sender: sender.to_string(),
                supported: self.senders().into_iter().map(String::from).collect(),
            })
    }

    /// Name first, then sender. The error reports the name lookup.
    pub fn lookup(&self, name_or_sender: &str) -> Result<&Provider, RegistryError> {
        match self.lookup_by_name(name_or_sender) {
            Ok(provider) => Ok(provider),
            Err(err) => self.lookup_by_sender(name_or_sender).map_err(|_| err),
        }
    }

    /// A configured copy of the named provider, or `None` when unknown.
    ///
    /// An empty name selects the generic provider.
    pub fn instantiate(&self, name: &str, overrides: &ProfileOverrides) -> Option<Provider> {
        let name = if name.is_empty() { GENERIC_PROVIDER } else { name };
        let mut provider = match self.lookup_by_name(name) {
            Ok(provider) => provider.clone(),
            Err(err) => {
                tracing::debug!(error = %err, "Provider lookup failed");
                return None;
            }
        };

        if let Some(organizer) = &overrides.default_organizer {
            provider = provider.with_default_organizer(organizer);
        }
        if let Some(default_provider) = &overrides.default_provider {
            provider = provider.with_default_provider(default_provider);
        }
        if let Some(backend) = &overrides.llm_backend {
            provider = provider.with_llm_fallback(Arc::clone(backend));
        }
        Some(provider)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(Provider::name).collect()
    }

    /// Sender addresses, deduplicated.
    pub fn senders(&self) -> Vec<&str> {
        let mut senders: Vec<&str> = Vec::new();
        for sender in self.providers.iter().map(Provider::default_organizer) {
            if !senders.contains(&sender) {
                senders.push(sender);
            }
        }
        senders
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// The process-wide registry of built-in profiles, built on first use.
pub fn registry() -> Result<&'static ProviderRegistry, RegistryError> {
    let result = BUILTIN_REGISTRY.get_or_init(|| ProviderRegistry::with_defaults().map_err(|e| e.to_string()));
    result.as_ref().map_err(|e| RegistryError::Builtin(e.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::PartialRecord;
    use crate::provider::UNKNOWN_ORGANIZER;

    struct NeverBackend;

    impl LlmBackend for NeverBackend {
        fn ask(&self, _system: &str, _question: &str) -> Option<PartialRecord> {
            None
        }
    }

    #[test]
    fn test_builtin_profiles_load() {
        let registry = registry().unwrap();
        assert_eq!(
            registry.names(),
            vec![GENERIC_PROVIDER, "arelion", "eunetworks", "ntt", "packetfabric", "telia"]
        );
    }

    #[test]
    fn test_lookup_by_name_ignores_case() {
        let registry = registry().unwrap();
        assert_eq!(registry.lookup_by_name("NTT").unwrap().name(), "ntt");
    }

    #[test]
    fn test_lookup_by_sender() {
        let registry = registry().unwrap();
        assert_eq!(registry.lookup_by_sender("noc@eunetworks.com").unwrap().name(), "eunetworks");
        assert!(registry.lookup_by_sender("NOC@eunetworks.com").is_err());
        assert_eq!(registry.lookup("support@packetfabric.com").unwrap().name(), "packetfabric");
    }

    #[test]
    fn test_unknown_provider_lists_supported() {
        let registry = registry().unwrap();
        let err = registry.lookup_by_name("acme").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("acme is not a currently supported provider."));
        assert!(message.contains("genericprovider, arelion"));

        let err = registry.lookup("nobody@example.com").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownProvider { .. }));
    }

    #[test]
    fn test_instantiate() {
        let registry = registry().unwrap();
        assert!(registry.instantiate("acme", &ProfileOverrides::default()).is_none());

        let generic = registry.instantiate("", &ProfileOverrides::default()).unwrap();
        assert_eq!(generic.name(), GENERIC_PROVIDER);
        assert_eq!(generic.default_organizer(), UNKNOWN_ORGANIZER);

        let overrides = ProfileOverrides {
            default_organizer: Some("noc@example.net".to_string()),
            default_provider: Some("Example".to_string()),
            llm_backend: Some(Arc::new(NeverBackend)),
        };
        let provider = registry.instantiate("ntt", &overrides).unwrap();
        assert_eq!(provider.default_organizer(), "noc@example.net");
        assert_eq!(provider.default_provider(), "Example");
        assert_eq!(provider.processors().len(), 2);
        assert!(provider.processors()[1].parser_names().contains(&"llm"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(Provider::generic());
        registry.register(Provider::generic().with_default_organizer("noc@example.net"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.senders(), vec!["noc@example.net"]);
    }

    #[test]
    fn test_shared_sender_resolves_to_first() {
        let registry = registry().unwrap();
        assert_eq!(registry.senders().len(), registry.len() - 1);
        assert_eq!(registry.lookup_by_sender("support@arelion.com").unwrap().name(), "arelion");
    }
}
