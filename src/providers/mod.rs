//! Resource info providers and their registration from configuration.

mod rms;

pub use rms::RmsResourceProvider;

use crate::cache::ProviderRegistry;
use crate::cloudeye::http_client;
use crate::core::{Config, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

static TAG_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("tag key pattern is valid"));

/// Tags whose key is a usable label name, sorted by key.
pub fn valid_tags(tags: &HashMap<String, String>) -> Vec<(&str, &str)> {
    let mut valid: Vec<(&str, &str)> = tags
        .iter()
        .filter(|(key, _)| TAG_KEY.is_match(key))
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    valid.sort_unstable_by(|a, b| a.0.cmp(b.0));
    valid
}

/// Registers a resource provider for every namespace with a `resource`
/// section. Namespaces without one rely on the metric catalog only.
pub fn build_registry(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    let http = http_client(config.cloud.request_timeout)?;

    for (namespace, settings) in &config.namespaces {
        let Some(resource) = settings.resource.clone() else {
            continue;
        };
        info!(
            namespace = %namespace,
            provider = %resource.provider,
            resource_type = %resource.resource_type,
            refresh = ?settings.refresh,
            "Registered resource provider"
        );
        let provider = RmsResourceProvider::new(http.clone(), &config.cloud, namespace, resource);
        registry.register(namespace.as_str(), Arc::new(provider), settings.refresh);
    }

    Ok(registry)
}
