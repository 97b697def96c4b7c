use super::{ProviderRegistry, RefreshPolicy, ResourceInfoProvider};
use crate::core::ResourceInfo;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Cache entry of one namespace. Labels, filter metrics and expiry are
/// replaced together under the slot lock.
#[derive(Default)]
struct Slot {
    info: Option<Arc<ResourceInfo>>,
    expires_at: Option<Instant>,
    refreshing: bool,
}

impl Slot {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now < expires_at)
    }

    fn store(&mut self, info: ResourceInfo, ttl: Duration) {
        self.info = Some(Arc::new(info));
        self.expires_at = Some(Instant::now() + ttl);
    }
}

/// TTL cache of resource labels, one lazily created slot per namespace.
pub struct NamespaceResourceCache {
    registry: ProviderRegistry,
    ttl: Duration,
    slots: DashMap<String, Arc<Mutex<Slot>>>,
}

impl NamespaceResourceCache {
    pub fn new(registry: ProviderRegistry, ttl: Duration) -> Self {
        Self {
            registry,
            ttl,
            slots: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, namespace: &str) -> Arc<Mutex<Slot>> {
        let entry = self.slots.entry(namespace.to_string()).or_default();
        Arc::clone(entry.value())
    }

    /// Current resource info of `namespace`, refreshing it when expired.
    ///
    /// Returns `None` for namespaces without a provider, and for
    /// namespaces whose provider has never succeeded. A failed refresh
    /// keeps the previous value.
    pub async fn get_or_refresh(&self, namespace: &str) -> Option<Arc<ResourceInfo>> {
        let (provider, policy) = self.registry.get(namespace)?;
        let slot = self.slot(namespace);

        match policy {
            RefreshPolicy::Sync => self.refresh_sync(namespace, provider, &slot).await,
            RefreshPolicy::AsyncStale => self.refresh_stale(namespace, provider, slot).await,
        }
    }

    async fn refresh_sync(
        &self,
        namespace: &str,
        provider: Arc<dyn ResourceInfoProvider>,
        slot: &Mutex<Slot>,
    ) -> Option<Arc<ResourceInfo>> {
        let mut entry = slot.lock().await;
        if entry.is_fresh(Instant::now()) {
            return entry.info.clone();
        }

        match provider.get_resource_info().await {
            Ok(info) => {
                debug!(namespace, resources = info.labels.len(), "Refreshed resource cache");
                entry.store(info, self.ttl);
            },
            Err(e) => {
                warn!(namespace, error = %e, "Resource enumeration failed, keeping previous labels");
            },
        }
        entry.info.clone()
    }

    async fn refresh_stale(
        &self,
        namespace: &str,
        provider: Arc<dyn ResourceInfoProvider>,
        slot: Arc<Mutex<Slot>>,
    ) -> Option<Arc<ResourceInfo>> {
        let mut entry = slot.lock().await;
        let current = entry.info.clone();
        if entry.is_fresh(Instant::now()) || entry.refreshing {
            return current;
        }

        entry.refreshing = true;
        drop(entry);

        let ttl = self.ttl;
        let namespace = namespace.to_string();
        tokio::spawn(async move {
            let result = provider.get_resource_info().await;
            let mut entry = slot.lock().await;
            entry.refreshing = false;
            match result {
                Ok(info) => {
                    debug!(namespace = %namespace, resources = info.labels.len(), "Refreshed resource cache in background");
                    entry.store(info, ttl);
                },
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Background resource enumeration failed, keeping previous labels");
                },
            }
        });

        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BridgeError, ResourceLabel, Result};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ResourceInfoProvider for CountingProvider {
        async fn get_resource_info(&self) -> Result<ResourceInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(BridgeError::resource_enumeration("SYS.ECS", "boom"));
            }
            let mut info = ResourceInfo::default();
            info.labels
                .insert("r1".to_string(), ResourceLabel::from_pairs([("host", "h1")]));
            Ok(info)
        }
    }

    fn cache_with(
        provider: Arc<CountingProvider>,
        policy: RefreshPolicy,
        ttl: Duration,
    ) -> NamespaceResourceCache {
        let mut registry = ProviderRegistry::new();
        registry.register("SYS.ECS", provider, policy);
        NamespaceResourceCache::new(registry, ttl)
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_hits_cache() {
        let provider = CountingProvider::new(Duration::ZERO);
        let cache = cache_with(
            Arc::clone(&provider),
            RefreshPolicy::Sync,
            Duration::from_secs(3600),
        );

        let first = cache.get_or_refresh("SYS.ECS").await.unwrap();
        let second = cache.get_or_refresh("SYS.ECS").await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.labels["r1"].get("host"), Some("h1"));
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_refresh_once() {
        let provider = CountingProvider::new(Duration::from_millis(50));
        let cache = Arc::new(cache_with(
            Arc::clone(&provider),
            RefreshPolicy::Sync,
            Duration::from_secs(3600),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.get_or_refresh("SYS.ECS").await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_callers_racing_past_expiry_refresh_once() {
        let provider = CountingProvider::new(Duration::from_millis(50));
        let cache = Arc::new(cache_with(
            Arc::clone(&provider),
            RefreshPolicy::Sync,
            Duration::from_millis(300),
        ));

        let filled = cache.get_or_refresh("SYS.ECS").await.unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.get_or_refresh("SYS.ECS").await
            }));
        }
        for handle in handles {
            let info = handle.await.unwrap().unwrap();
            assert!(!Arc::ptr_eq(&info, &filled));
        }

        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let provider = CountingProvider::new(Duration::ZERO);
        let cache = cache_with(Arc::clone(&provider), RefreshPolicy::Sync, Duration::ZERO);

        assert!(cache.get_or_refresh("SYS.ECS").await.is_some());

        provider.fail.store(true, Ordering::SeqCst);
        let stale = cache.get_or_refresh("SYS.ECS").await;

        assert_eq!(provider.calls(), 2);
        assert!(stale.is_some_and(|info| info.labels.contains_key("r1")));
    }

    #[tokio::test]
    async fn test_failed_first_refresh_returns_none() {
        let provider = CountingProvider::new(Duration::ZERO);
        provider.fail.store(true, Ordering::SeqCst);
        let cache = cache_with(
            Arc::clone(&provider),
            RefreshPolicy::Sync,
            Duration::from_secs(60),
        );

        assert!(cache.get_or_refresh("SYS.ECS").await.is_none());
        // Failures do not extend the expiry, the next call retries.
        assert!(cache.get_or_refresh("SYS.ECS").await.is_none());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_async_stale_returns_immediately_then_fills() {
        let provider = CountingProvider::new(Duration::from_millis(20));
        let cache = cache_with(
            Arc::clone(&provider),
            RefreshPolicy::AsyncStale,
            Duration::from_secs(3600),
        );

        assert!(cache.get_or_refresh("SYS.ECS").await.is_none());
        // A second caller while the refresh is running must not start another.
        assert!(cache.get_or_refresh("SYS.ECS").await.is_none());

        let mut filled = None;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            filled = cache.get_or_refresh("SYS.ECS").await;
            if filled.is_some() {
                break;
            }
        }

        assert!(filled.is_some());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_namespace_is_a_miss() {
        let provider = CountingProvider::new(Duration::ZERO);
        let cache = cache_with(
            Arc::clone(&provider),
            RefreshPolicy::Sync,
            Duration::from_secs(60),
        );

        assert!(cache.get_or_refresh("SYS.EVS").await.is_none());
        assert_eq!(provider.calls(), 0);
    }
}
