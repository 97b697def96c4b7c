//! Batch partitioning and bounded dispatch.

use crate::core::{MetricIdentifier, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Outputs of one dispatch. Failed batches contribute nothing.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub batches: usize,
    pub failed: usize,
    pub outputs: Vec<T>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            batches: 0,
            failed: 0,
            outputs: Vec::new(),
        }
    }
}

/// Splits identifiers into fixed-size batches and runs one task per batch,
/// never more than the semaphore allows at once.
///
/// The semaphore may be shared by several schedulers to bound the total
/// number of in-flight batches across namespaces.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    permits: Arc<Semaphore>,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, permits: Arc<Semaphore>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            permits,
        }
    }

    /// Scheduler with its own semaphore of `limit` permits.
    pub fn with_limit(batch_size: usize, limit: usize) -> Self {
        Self::new(batch_size, Arc::new(Semaphore::new(limit.max(1))))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// `ceil(N / B)` batches, each keeping the input order.
    pub fn partition(&self, identifiers: &[MetricIdentifier]) -> Vec<Vec<MetricIdentifier>> {
        identifiers
            .chunks(self.batch_size)
            .map(<[MetricIdentifier]>::to_vec)
            .collect()
    }

    /// Runs `task(index, batch)` for every batch and waits for all of them.
    ///
    /// A batch whose task fails (or panics) is logged and counted in
    /// [`BatchOutcome::failed`]; sibling batches are unaffected.
    pub async fn run<F, Fut, T>(
        &self,
        namespace: &str,
        identifiers: &[MetricIdentifier],
        mut task: F,
    ) -> BatchOutcome<T>
    where
        F: FnMut(usize, Vec<MetricIdentifier>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let batches = self.partition(identifiers);
        let mut outcome = BatchOutcome {
            batches: batches.len(),
            ..BatchOutcome::default()
        };
        let mut tasks = JoinSet::new();

        for (index, batch) in batches.into_iter().enumerate() {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(namespace, batch = index, "Batch semaphore closed, skipping remaining batches");
                    outcome.failed += outcome.batches - index;
                    break;
                },
            };

            debug!(namespace, batch = index, size = batch.len(), "Dispatching batch");
            let future = task(index, batch);
            tasks.spawn(async move {
                let result = future.await;
                drop(permit);
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(output))) => outcome.outputs.push(output),
                Ok((index, Err(e))) => {
                    warn!(namespace, batch = index, error = %e, category = e.category(), "Batch failed");
                    outcome.failed += 1;
                },
                Err(e) => {
                    warn!(namespace, error = %e, "Batch task aborted");
                    outcome.failed += 1;
                },
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BridgeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn identifiers(n: usize) -> Vec<MetricIdentifier> {
        (0..n)
            .map(|i| {
                MetricIdentifier::new("SYS.ECS", "cpu_util").with_dimension("instance_id", format!("i-{i}"))
            })
            .collect()
    }

    #[test]
    fn test_partition_sizes() {
        let scheduler = BatchScheduler::with_limit(10, 3);
        let batches = scheduler.partition(&identifiers(25));

        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(batches[2][0].dimensions[0].value, "i-20");
        assert!(scheduler.partition(&[]).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let scheduler = BatchScheduler::with_limit(1, 3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcome = scheduler
            .run("SYS.ECS", &identifiers(12), |_, batch| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, BridgeError>(batch.len())
                }
            })
            .await;

        assert_eq!(outcome.batches, 12);
        assert_eq!(outcome.outputs.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_failed_batch_is_isolated() {
        let scheduler = BatchScheduler::with_limit(10, 2);

        let outcome = scheduler
            .run("SYS.ECS", &identifiers(25), |index, batch| async move {
                if index == 1 {
                    return Err(BridgeError::network("connection reset"));
                }
                Ok::<_, BridgeError>(batch.len())
            })
            .await;

        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.failed, 1);
        let mut sizes = outcome.outputs;
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 10]);
    }

    #[tokio::test]
    async fn test_shared_semaphore_is_released() {
        let permits = Arc::new(Semaphore::new(2));
        let first = BatchScheduler::new(5, Arc::clone(&permits));
        let second = BatchScheduler::new(5, Arc::clone(&permits));

        let (ecs, evs) = (identifiers(10), identifiers(7));
        let (a, b) = tokio::join!(
            first.run("SYS.ECS", &ecs, |_, batch| async move { Ok::<_, BridgeError>(batch.len()) }),
            second.run("SYS.EVS", &evs, |_, batch| async move { Ok::<_, BridgeError>(batch.len()) }),
        );

        assert_eq!(a.outputs.iter().sum::<usize>(), 10);
        assert_eq!(b.outputs.iter().sum::<usize>(), 7);
        assert_eq!(permits.available_permits(), 2);
    }
}
