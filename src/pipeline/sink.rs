//! Cancellation-aware output of a collection cycle.

use crate::core::Series;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Forwards finished series to the consumer of one cycle.
///
/// Once the cycle's token is cancelled every further series is dropped
/// silently. Series sent before cancellation stay in the channel.
#[derive(Debug)]
pub struct Sink {
    tx: mpsc::Sender<Series>,
    token: CancellationToken,
    dropped: AtomicUsize,
}

impl Sink {
    /// Creates a sink and the receiving end of its bounded channel.
    pub fn channel(capacity: usize, token: CancellationToken) -> (Self, mpsc::Receiver<Series>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            token,
            dropped: AtomicUsize::new(0),
        };
        (sink, rx)
    }

    /// Sends one series. Returns false if it was dropped because the cycle
    /// is cancelled or the consumer went away.
    pub async fn emit(&self, series: Series) -> bool {
        if self.token.is_cancelled() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let sent = tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            result = self.tx.send(series) => result.is_ok(),
        };
        if !sent {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Series dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
