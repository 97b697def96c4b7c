//! One collection cycle across the requested namespaces.

use super::guard::{ConflictGuard, DEFAULT_GUARDED_NAMESPACES};
use super::joiner::LabelJoiner;
use super::scheduler::BatchScheduler;
use super::sink::Sink;
use crate::cache::NamespaceResourceCache;
use crate::cloudeye::{MetricCatalog, MetricDataFetcher};
use crate::core::{BridgeError, Config, MetricIdentifier};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Query range of a cycle, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub from: i64,
    pub to: i64,
}

impl QueryWindow {
    /// `to = now - offset`, `from = to - length`.
    pub fn ending_at(now_ms: i64, offset: Duration, length: Duration) -> Self {
        let to = now_ms - offset.as_millis() as i64;
        Self {
            from: to - length.as_millis() as i64,
            to,
        }
    }

    pub fn now(offset: Duration, length: Duration) -> Self {
        Self::ending_at(chrono::Utc::now().timestamp_millis(), offset, length)
    }
}

/// Counters of one cycle, or of one namespace within it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub namespaces: usize,
    /// Namespaces skipped because metric discovery failed
    pub failed_namespaces: Vec<String>,
    pub batches: usize,
    pub failed_batches: usize,
    /// Data series delivered to the sink
    pub emitted: usize,
    /// Series without a datapoint in the window
    pub empty: usize,
    /// Series dropped for inconsistent labels
    pub mismatched: usize,
    /// Duplicates rejected by the conflict guard
    pub suppressed: usize,
    /// Series dropped by a cancelled sink
    pub dropped: usize,
    /// Timestamp of the newest datapoint delivered, epoch milliseconds
    pub newest_datapoint_ms: Option<i64>,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.failed_namespaces.extend(other.failed_namespaces);
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
        self.emitted += other.emitted;
        self.empty += other.empty;
        self.mismatched += other.mismatched;
        self.suppressed += other.suppressed;
        self.dropped += other.dropped;
        self.newest_datapoint_ms = self.newest_datapoint_ms.max(other.newest_datapoint_ms);
    }
}

/// Runs collection cycles. Cheap to clone; clones share the cache, the
/// remote clients and the batch semaphore.
#[derive(Clone)]
pub struct Collector {
    cache: Arc<NamespaceResourceCache>,
    catalog: Arc<dyn MetricCatalog>,
    fetcher: Arc<dyn MetricDataFetcher>,
    joiner: Arc<LabelJoiner>,
    scheduler: BatchScheduler,
    guarded: Arc<Vec<String>>,
    retrieve_offset: Duration,
    query_window: Duration,
}

impl Collector {
    /// The semaphore of `max_routines` permits is shared by every
    /// namespace of every cycle.
    pub fn new(
        config: &Config,
        cache: Arc<NamespaceResourceCache>,
        catalog: Arc<dyn MetricCatalog>,
        fetcher: Arc<dyn MetricDataFetcher>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.global.max_routines));
        Self {
            cache,
            catalog,
            fetcher,
            joiner: Arc::new(LabelJoiner::from_config(config)),
            scheduler: BatchScheduler::new(config.global.scrape_batch_size, permits),
            guarded: Arc::new(
                DEFAULT_GUARDED_NAMESPACES
                    .iter()
                    .map(|ns| ns.to_string())
                    .collect(),
            ),
            retrieve_offset: config.global.retrieve_offset,
            query_window: config.global.query_window,
        }
    }

    /// Replaces the namespaces checked for duplicate series.
    pub fn with_guarded_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guarded = Arc::new(namespaces.into_iter().map(Into::into).collect());
        self
    }

    pub fn cache(&self) -> &NamespaceResourceCache {
        &self.cache
    }

    /// Collects every namespace concurrently and emits into `sink`.
    ///
    /// Failures are contained per namespace, batch or series; the report
    /// tells what was lost.
    pub async fn collect(&self, namespaces: &[String], sink: Arc<Sink>) -> CycleReport {
        let window = QueryWindow::now(self.retrieve_offset, self.query_window);
        let guard = Arc::new(ConflictGuard::new(self.guarded.iter().cloned()));

        let mut seen = HashSet::new();
        let mut tasks = JoinSet::new();
        for namespace in namespaces {
            if !seen.insert(namespace.as_str()) {
                continue;
            }
            let this = self.clone();
            let namespace = namespace.clone();
            let guard = Arc::clone(&guard);
            let sink = Arc::clone(&sink);
            tasks.spawn(async move { this.collect_namespace(namespace, window, guard, sink).await });
        }

        let mut report = CycleReport {
            namespaces: seen.len(),
            ..CycleReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(namespace_report) => report.merge(namespace_report),
                Err(e) => warn!(error = %BridgeError::from(e), "Namespace task aborted"),
            }
        }

        info!(
            namespaces = report.namespaces,
            failed_namespaces = report.failed_namespaces.len(),
            batches = report.batches,
            failed_batches = report.failed_batches,
            emitted = report.emitted,
            suppressed = report.suppressed,
            dropped = report.dropped,
            "Collection cycle finished"
        );
        report
    }

    async fn collect_namespace(
        self,
        namespace: String,
        window: QueryWindow,
        guard: Arc<ConflictGuard>,
        sink: Arc<Sink>,
    ) -> CycleReport {
        let mut report = CycleReport::default();
        let info = self.cache.get_or_refresh(&namespace).await;

        let discovered: Vec<MetricIdentifier>;
        let identifiers: &[MetricIdentifier] = match info.as_deref() {
            Some(info) if !info.filter_metrics.is_empty() => &info.filter_metrics,
            _ => match self.catalog.list_all(&namespace).await {
                Ok(found) => {
                    discovered = found;
                    &discovered
                },
                Err(e) => {
                    let err = BridgeError::metric_discovery(&namespace, e.to_string());
                    warn!(namespace = %namespace, error = %err, "Skipping namespace this cycle");
                    report.failed_namespaces.push(namespace);
                    return report;
                },
            },
        };

        if identifiers.is_empty() {
            debug!(namespace = %namespace, "No metrics to collect");
            return report;
        }

        let outcome = self
            .scheduler
            .run(&namespace, identifiers, |index, batch| {
                let fetcher = Arc::clone(&self.fetcher);
                let joiner = Arc::clone(&self.joiner);
                let guard = Arc::clone(&guard);
                let sink = Arc::clone(&sink);
                let info = info.as_ref().map(Arc::clone);
                let namespace = namespace.clone();

                async move {
                    let data = fetcher
                        .batch_query(&batch, window.from, window.to)
                        .await
                        .map_err(|e| BridgeError::BatchFetch {
                            namespace: namespace.clone(),
                            batch: index,
                            message: e.to_string(),
                        })?;
                    debug!(namespace = %namespace, batch = index, series = data.len(), "Fetched batch");

                    let labels = info.as_deref().map(|info| &info.labels);
                    let mut counts = CycleReport::default();
                    for series_data in &data {
                        match joiner.join(series_data, window, labels) {
                            Ok(Some(series)) => {
                                if !guard.admit(&namespace, &series) {
                                    counts.suppressed += 1;
                                } else if sink.emit(series).await {
                                    counts.emitted += 1;
                                    let seen = series_data
                                        .latest_within(window.from, window.to)
                                        .map(|point| point.timestamp);
                                    counts.newest_datapoint_ms = counts.newest_datapoint_ms.max(seen);
                                } else {
                                    counts.dropped += 1;
                                }
                            },
                            Ok(None) => {
                                debug!(namespace = %namespace, metric = %series_data.identifier, "No datapoint in window");
                                counts.empty += 1;
                            },
                            Err(e) => {
                                warn!(namespace = %namespace, batch = index, error = %e, category = e.category(), "Dropping series");
                                counts.mismatched += 1;
                            },
                        }
                    }
                    Ok(counts)
                }
            })
            .await;

        report.batches = outcome.batches;
        report.failed_batches = outcome.failed;
        for counts in outcome.outputs {
            report.merge(counts);
        }

        if let Some(newest) = report.newest_datapoint_ms {
            let lag = self.joiner.lag_series(&namespace, window.to - newest);
            if !sink.emit(lag).await {
                report.dropped += 1;
            }
        }
        report
    }
}
