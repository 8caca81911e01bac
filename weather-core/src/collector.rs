//! Fan-out collection of current weather from every (source, location) pair.
//!
//! [`Collector::start`] launches one repeating task per pair. Each task
//! fetches immediately, then again every refresh interval, with every
//! individual fetch bounded by its own timeout. Readings go to a bounded
//! output channel (blocking send, raced against cancellation); errors go to a
//! bounded error channel on a best-effort basis (a full channel drops the
//! report rather than stalling collection).
//!
//! Pairs are independent: one pair's failure or slow upstream never delays
//! another pair, and within a pair fetches are strictly sequential, so
//! staleness is bounded by `refresh_interval + fetch_timeout`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::WeatherReading;
use crate::provider::{Provider, ProviderError, WeatherProvider};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// A failed collection attempt for one (source, location) pair on one tick.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The fetch did not resolve within the per-fetch timeout.
    #[error("{provider}: fetch for {location} timed out after {timeout:?}")]
    Timeout {
        provider: String,
        location: String,
        timeout: Duration,
    },

    /// The source itself reported a failure.
    #[error("{provider}: fetch for {location} failed: {source}")]
    Fetch {
        provider: String,
        location: String,
        #[source]
        source: ProviderError,
    },
}

/// Owns the sources and locations to poll. Configuration happens before
/// [`start`](Collector::start); afterwards the running tasks are reachable
/// only through the returned [`CollectorHandle`].
pub struct Collector {
    sources: Vec<Arc<dyn WeatherProvider>>,
    locations: Vec<String>,
    refresh_interval: Duration,
    fetch_timeout: Duration,
    channel_capacity: usize,
}

impl Collector {
    pub fn new(sources: Vec<Arc<dyn WeatherProvider>>, locations: Vec<String>) -> Self {
        Self {
            sources,
            locations,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Launch one repeating fetch task per (source, location) pair.
    ///
    /// Every task observes a child of `parent`, so cancelling the parent
    /// token stops collection just like [`CollectorHandle::stop`] does. Both
    /// channels close once every task has exited; the coordinator task inside
    /// the handle waits for exactly that.
    pub fn start(
        self,
        parent: &CancellationToken,
    ) -> (
        CollectorHandle,
        mpsc::Receiver<WeatherReading>,
        mpsc::Receiver<CollectError>,
    ) {
        let cancel = parent.child_token();
        let (out_tx, out_rx) = mpsc::channel(self.channel_capacity);
        let (err_tx, err_rx) = mpsc::channel(self.channel_capacity);

        let mut tasks = JoinSet::new();
        for source in &self.sources {
            for location in &self.locations {
                tasks.spawn(collect_pair(
                    source.clone(),
                    location.clone(),
                    self.refresh_interval,
                    self.fetch_timeout,
                    out_tx.clone(),
                    err_tx.clone(),
                    cancel.clone(),
                ));
            }
        }

        info!(
            sources = self.sources.len(),
            locations = self.locations.len(),
            "collector started"
        );

        // The per-task sender clones are the only senders left after this
        // point, so the channels close exactly when the last task exits.
        drop(out_tx);
        drop(err_tx);

        let coordinator = tokio::spawn(async move {
            while tasks.join_next().await.is_some() {}
            debug!("all collection tasks exited");
        });

        (CollectorHandle { cancel, coordinator }, out_rx, err_rx)
    }
}

/// Handle to a running collection. `stop` consumes the handle, so a second
/// stop is rejected at compile time rather than left as unspecified runtime
/// behavior.
pub struct CollectorHandle {
    cancel: CancellationToken,
    coordinator: JoinHandle<()>,
}

impl CollectorHandle {
    /// Cancel every collection task and wait until all of them have exited.
    ///
    /// After this returns no further sends happen on either channel; a fetch
    /// that was in flight is abandoned within its timeout bound.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.coordinator.await;
        info!("collector stopped");
    }
}

async fn collect_pair(
    source: Arc<dyn WeatherProvider>,
    location: String,
    refresh_interval: Duration,
    fetch_timeout: Duration,
    out_tx: mpsc::Sender<WeatherReading>,
    err_tx: mpsc::Sender<CollectError>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick fires immediately, giving the initial fetch on startup.
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                fetch_once(&source, &location, fetch_timeout, &out_tx, &err_tx, &cancel).await;
            }
        }
    }
}

/// One collection attempt: bounded fetch, then report the outcome.
async fn fetch_once(
    source: &Arc<dyn WeatherProvider>,
    location: &str,
    fetch_timeout: Duration,
    out_tx: &mpsc::Sender<WeatherReading>,
    err_tx: &mpsc::Sender<CollectError>,
    cancel: &CancellationToken,
) {
    let fetched = tokio::select! {
        res = tokio::time::timeout(fetch_timeout, source.fetch_current(location)) => res,
        () = cancel.cancelled() => return,
    };

    let err = match fetched {
        Ok(Ok(reading)) => {
            tokio::select! {
                sent = out_tx.send(reading) => {
                    if sent.is_err() {
                        debug!(location, "readings channel closed, dropping reading");
                    }
                }
                () = cancel.cancelled() => {}
            }
            return;
        }
        Ok(Err(source_err)) => CollectError::Fetch {
            provider: source.name(),
            location: location.to_string(),
            source: source_err,
        },
        Err(_) => CollectError::Timeout {
            provider: source.name(),
            location: location.to_string(),
            timeout: fetch_timeout,
        },
    };

    warn!(error = %err, "weather fetch failed");
    // Best effort: when the error channel is full the report is dropped so
    // the next tick is never delayed by slow error consumers.
    let _ = err_tx.try_send(err);
}
