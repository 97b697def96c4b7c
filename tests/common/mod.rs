//! Common test utilities and fakes of the remote collaborators.

#![allow(dead_code)]

use cloudeye_bridge::cache::{NamespaceResourceCache, ProviderRegistry, RefreshPolicy, ResourceInfoProvider};
use cloudeye_bridge::cloudeye::{MetricCatalog, MetricDataFetcher};
use cloudeye_bridge::core::{
    BridgeError, Config, ConfigBuilder, Datapoint, MetricIdentifier, MetricSeriesData,
    ResourceInfo, ResourceLabel, Result, Series,
};
use cloudeye_bridge::pipeline::{Collector, CycleReport, Sink};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Provider returning a fixed resource set.
pub struct FakeProvider {
    info: ResourceInfo,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(info: ResourceInfo) -> Arc<Self> {
        Arc::new(Self {
            info,
            calls: AtomicUsize::new(0),
        })
    }

    /// One resource `key` carrying `labels`.
    pub fn single(key: &str, labels: &[(&str, &str)]) -> Arc<Self> {
        let mut info = ResourceInfo::default();
        info.labels.insert(
            key.to_string(),
            ResourceLabel::from_pairs(labels.iter().copied()),
        );
        Self::new(info)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ResourceInfoProvider for FakeProvider {
    async fn get_resource_info(&self) -> Result<ResourceInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.clone())
    }
}

/// Catalog backed by a map; listed namespaces in `failing` return an error.
#[derive(Default)]
pub struct FakeCatalog {
    metrics: HashMap<String, Vec<MetricIdentifier>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, namespace: &str, metrics: Vec<MetricIdentifier>) -> Self {
        self.metrics.insert(namespace.to_string(), metrics);
        self
    }

    pub fn failing(mut self, namespace: &str) -> Self {
        self.failing.insert(namespace.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MetricCatalog for FakeCatalog {
    async fn list_all(&self, namespace: &str) -> Result<Vec<MetricIdentifier>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(namespace) {
            return Err(BridgeError::network("catalog unavailable"));
        }
        Ok(self.metrics.get(namespace).cloned().unwrap_or_default())
    }
}

/// Fetcher answering every requested identifier with one datapoint.
///
/// A batch containing the metric named by `fail_on` fails as a whole.
pub struct FakeFetcher {
    unit: String,
    values: HashMap<MetricIdentifier, f64>,
    empty: HashSet<MetricIdentifier>,
    fail_on: Option<String>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            values: HashMap::new(),
            empty: HashSet::new(),
            fail_on: None,
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn value(mut self, identifier: MetricIdentifier, value: f64) -> Self {
        self.values.insert(identifier, value);
        self
    }

    /// Answers `identifier` without any datapoint.
    pub fn empty(mut self, identifier: MetricIdentifier) -> Self {
        self.empty.insert(identifier);
        self
    }

    pub fn fail_on(mut self, metric_name: &str) -> Self {
        self.fail_on = Some(metric_name.to_string());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MetricDataFetcher for FakeFetcher {
    async fn batch_query(
        &self,
        metrics: &[MetricIdentifier],
        _from: i64,
        to: i64,
    ) -> Result<Vec<MetricSeriesData>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(fail_on) = &self.fail_on {
            if metrics.iter().any(|m| &m.metric_name == fail_on) {
                return Err(BridgeError::Status {
                    status: 500,
                    body: "internal error".to_string(),
                });
            }
        }

        Ok(metrics
            .iter()
            .map(|identifier| {
                let datapoints = if self.empty.contains(identifier) {
                    Vec::new()
                } else {
                    let value = self.values.get(identifier).copied().unwrap_or(1.0);
                    vec![
                        Datapoint {
                            average: value / 2.0,
                            timestamp: to - 120_000,
                        },
                        Datapoint {
                            average: value,
                            timestamp: to - 60_000,
                        },
                    ]
                };
                MetricSeriesData {
                    identifier: identifier.clone(),
                    unit: self.unit.clone(),
                    datapoints,
                }
            })
            .collect())
    }
}

/// `count` identifiers `<metric>_<i>` with dimension `instance_id=r<i>`.
pub fn identifiers(namespace: &str, metric: &str, count: usize) -> Vec<MetricIdentifier> {
    (0..count)
        .map(|i| {
            MetricIdentifier::new(namespace, format!("{metric}_{i}"))
                .with_dimension("instance_id", format!("r{i}"))
        })
        .collect()
}

pub fn test_config(batch_size: usize, max_routines: usize) -> Config {
    ConfigBuilder::new()
        .batch_size(batch_size)
        .max_routines(max_routines)
        .build()
        .unwrap()
}

/// Collector over the given fakes. `providers` are registered synchronously.
pub fn collector(
    config: &Config,
    providers: Vec<(&str, Arc<dyn ResourceInfoProvider>)>,
    catalog: Arc<dyn MetricCatalog>,
    fetcher: Arc<dyn MetricDataFetcher>,
) -> Collector {
    let mut registry = ProviderRegistry::new();
    for (namespace, provider) in providers {
        registry.register(namespace, provider, RefreshPolicy::Sync);
    }
    let cache = Arc::new(NamespaceResourceCache::new(
        registry,
        config.global.resource_ttl,
    ));
    Collector::new(config, cache, catalog, fetcher)
}

/// Runs one cycle and returns its data series sorted by name and labels.
pub async fn run_cycle(collector: &Collector, namespaces: &[&str]) -> (Vec<Series>, CycleReport) {
    run_cycle_with_token(collector, namespaces, CancellationToken::new()).await
}

/// Like [`run_cycle`], with a caller-owned cancellation token.
pub async fn run_cycle_with_token(
    collector: &Collector,
    namespaces: &[&str],
    token: CancellationToken,
) -> (Vec<Series>, CycleReport) {
    let (mut series, report) = run_cycle_all(collector, namespaces, token).await;
    series.retain(|s| !is_lag_series(s));
    (series, report)
}

/// Every series of a cycle, namespace lag gauges included.
pub async fn run_cycle_all(
    collector: &Collector,
    namespaces: &[&str],
    token: CancellationToken,
) -> (Vec<Series>, CycleReport) {
    let namespaces: Vec<String> = namespaces.iter().map(|ns| ns.to_string()).collect();
    let (sink, mut rx) = Sink::channel(4096, token);
    let collector = collector.clone();
    let cycle = tokio::spawn(async move { collector.collect(&namespaces, Arc::new(sink)).await });

    let mut series = Vec::new();
    while let Some(s) = rx.recv().await {
        series.push(s);
    }
    let report = cycle.await.unwrap();
    (sorted(series), report)
}

/// The per-namespace `<prefix>_<namespace>_duration_seconds` gauge.
pub fn is_lag_series(series: &Series) -> bool {
    series.name.ends_with("_duration_seconds") && series.labels.is_empty()
}

/// Orders a series set so multisets can be compared.
pub fn sorted(mut series: Vec<Series>) -> Vec<Series> {
    series.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.labels.names.cmp(&b.labels.names))
            .then_with(|| a.labels.values.cmp(&b.labels.values))
    });
    series
}

/// Label pairs of a series, in emission order.
pub fn label_pairs(series: &Series) -> Vec<(String, String)> {
    series
        .labels
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}
