//! Per-namespace resource label cache.
//!
//! Resource enumeration is expensive, so every namespace keeps its labels
//! for a TTL and refreshes them through a pluggable [`ResourceInfoProvider`].
//! Namespaces are isolated from each other: each one has its own slot and
//! its own lock.

mod namespace;

pub use namespace::NamespaceResourceCache;

use crate::core::{ResourceInfo, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// How a namespace refreshes its cache once the TTL has expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// The caller waits for the provider.
    #[default]
    Sync,
    /// The caller gets the current (possibly empty) value immediately and
    /// the provider runs in the background.
    AsyncStale,
}

/// Enumerates the resources of one namespace.
#[async_trait::async_trait]
pub trait ResourceInfoProvider: Send + Sync {
    async fn get_resource_info(&self) -> Result<ResourceInfo>;
}

#[derive(Clone)]
struct Registration {
    provider: Arc<dyn ResourceInfoProvider>,
    policy: RefreshPolicy,
}

/// Lookup table from namespace to its provider and refresh policy.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Registration>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the provider of a namespace.
    pub fn register(
        &mut self,
        namespace: impl Into<String>,
        provider: Arc<dyn ResourceInfoProvider>,
        policy: RefreshPolicy,
    ) {
        self.providers
            .insert(namespace.into(), Registration { provider, policy });
    }

    pub fn get(&self, namespace: &str) -> Option<(Arc<dyn ResourceInfoProvider>, RefreshPolicy)> {
        self.providers
            .get(namespace)
            .map(|reg| (Arc::clone(&reg.provider), reg.policy))
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.providers.contains_key(namespace)
    }

    /// Registered namespaces, sorted.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut namespaces: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        namespaces.sort_unstable();
        namespaces
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for namespace in self.namespaces() {
            if let Some(reg) = self.providers.get(namespace) {
                map.entry(&namespace, &reg.policy);
            }
        }
        map.finish()
    }
}
