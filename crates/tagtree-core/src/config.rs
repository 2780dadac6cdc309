//! Repository configuration and service assembly.

use std::sync::Arc;

use tagtree_model::{LanguageRegistry, StaticLanguageRegistry, TagsResult};

use crate::cache::{MemoryTagCache, TagAwareCache};
use crate::cached::CachedTagsHandler;
use crate::gateway::TagGateway;
use crate::handler::TagsHandler;
use crate::service::TagsService;

/// Tag repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsConfig {
    /// Registered language codes; the order fixes the mask bits.
    pub languages: Vec<String>,
    /// Wrap the handler in the caching decorator.
    pub cache_enabled: bool,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            languages: vec!["eng-GB".to_string()],
            cache_enabled: true,
        }
    }
}

impl TagsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            languages: std::env::var("TAGTREE_LANGUAGES")
                .ok()
                .map(|s| parse_languages(&s))
                .filter(|codes| !codes.is_empty())
                .unwrap_or(defaults.languages),
            cache_enabled: std::env::var("TAGTREE_CACHE")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.cache_enabled),
        }
    }

    pub fn language_registry(&self) -> TagsResult<Arc<dyn LanguageRegistry>> {
        let registry = StaticLanguageRegistry::new(self.languages.iter().cloned())?;
        Ok(Arc::new(registry))
    }

    /// Build the domain service over `gateway`, cached when enabled.
    pub fn build_service(
        &self,
        gateway: Arc<dyn TagGateway>,
        languages: Arc<dyn LanguageRegistry>,
    ) -> Arc<dyn TagsService> {
        let handler = TagsHandler::new(gateway, languages);
        if self.cache_enabled {
            let cache: Arc<dyn TagAwareCache> = Arc::new(MemoryTagCache::new());
            Arc::new(CachedTagsHandler::new(handler, cache))
        } else {
            Arc::new(handler)
        }
    }
}

fn parse_languages(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_config_default() {
        let config = TagsConfig::default();
        assert_eq!(config.languages, vec!["eng-GB"]);
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_parse_languages() {
        assert_eq!(
            parse_languages(" eng-GB, cro-HR,,ger-DE "),
            vec!["eng-GB", "cro-HR", "ger-DE"]
        );
        assert!(parse_languages(" , ").is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_language_registry_follows_configured_order() {
        let config = TagsConfig {
            languages: vec!["cro-HR".to_string(), "eng-GB".to_string()],
            cache_enabled: false,
        };
        let registry = config.language_registry().unwrap();
        assert_eq!(registry.language_id("cro-HR").unwrap(), 2);
        assert_eq!(registry.language_id("eng-GB").unwrap(), 4);
    }

    #[test]
    fn test_oversized_language_list_is_rejected() {
        let config = TagsConfig {
            languages: (0..70).map(|n| format!("l{:02}", n)).collect(),
            cache_enabled: false,
        };
        assert!(config.language_registry().err().unwrap().is_invalid_argument());
    }
}
