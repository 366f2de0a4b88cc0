//! # Snapshot Store & Refresh Scheduler
//!
//! The scheduler periodically rebuilds the graph from the event store and is
//! the only writer of the published snapshot. Readers hold a cheap
//! [`SnapshotReader`] and never observe a partially built graph: a snapshot is
//! swapped in whole, and a failed cycle leaves the previous one in place.

mod metrics;

pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};

use crate::config::RefreshConfig;
use crate::events::EventSource;
use crate::graph::{GraphBuilder, GraphSnapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};

/// Owner of the published snapshot and refresh status.
#[derive(Debug)]
pub struct SnapshotStore {
    graph: watch::Sender<Arc<GraphSnapshot>>,
    status: watch::Sender<RefreshMetricsSnapshot>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Start with an empty graph.
    pub fn new() -> Self {
        let (graph, _) = watch::channel(Arc::new(GraphSnapshot::default()));
        let (status, _) = watch::channel(RefreshMetricsSnapshot::default());
        Self { graph, status }
    }

    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: GraphSnapshot) {
        self.graph.send_replace(Arc::new(snapshot));
    }

    pub fn report(&self, status: RefreshMetricsSnapshot) {
        self.status.send_replace(status);
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            graph: self.graph.subscribe(),
            status: self.status.subscribe(),
        }
    }
}

/// Read handle on the published snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    graph: watch::Receiver<Arc<GraphSnapshot>>,
    status: watch::Receiver<RefreshMetricsSnapshot>,
}

impl SnapshotReader {
    pub fn current(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.graph.borrow())
    }

    pub fn status(&self) -> RefreshMetricsSnapshot {
        self.status.borrow().clone()
    }

    /// Wait for the next published snapshot. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.graph.changed().await.is_ok()
    }
}

/// Periodic driver of refresh cycles.
pub struct RefreshScheduler {
    source: EventSource,
    builder: GraphBuilder,
    store: SnapshotStore,
    metrics: RefreshMetrics,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(source: EventSource, store: SnapshotStore, config: &RefreshConfig) -> Self {
        Self {
            source,
            builder: GraphBuilder::new(),
            store,
            metrics: RefreshMetrics::default(),
            interval: config.interval(),
        }
    }

    pub fn reader(&self) -> SnapshotReader {
        self.store.reader()
    }

    /// Run a single cycle: query container events, build, publish.
    ///
    /// On error the published snapshot is left untouched.
    pub async fn refresh_once(&mut self) -> crate::Result<()> {
        let cycle = self.metrics.record_cycle_start();
        let span = info_span!("refresh_cycle", cycle);

        async {
            let started = Instant::now();
            let result = self.build_snapshot().await;
            let elapsed = started.elapsed();

            let outcome = match result {
                Ok(snapshot) => {
                    let (nodes, links) = (snapshot.nodes.len(), snapshot.links.len());
                    self.metrics.record_success(nodes, links, elapsed);
                    self.store.publish(snapshot);
                    info!(nodes, links, elapsed_ms = elapsed.as_millis() as u64, "Published graph snapshot");
                    Ok(())
                }
                Err(e) => {
                    self.metrics.record_failure(&e.to_string(), elapsed);
                    error!(error = %e, "Refresh cycle failed, keeping previous snapshot");
                    Err(e)
                }
            };
            self.store.report(self.metrics.snapshot());
            outcome
        }
        .instrument(span)
        .await
    }

    async fn build_snapshot(&mut self) -> crate::Result<GraphSnapshot> {
        let containers = self.source.container_events().await?;
        self.builder.build(&containers, &self.source).await
    }

    /// Refresh immediately, then every interval, until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.interval.as_secs(),
            database = self.source.database(),
            "Refresh scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.refresh_once() => {}
                    }
                }
            }
        }

        info!("Refresh scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, TopographError};
    use crate::store::mock::{container_row, flow_row};
    use crate::store::{CONTAINER_EVENTS_QUERY, FLOW_EVENTS_QUERY, MockEventStore};

    const TS: &str = "2017-11-08T06:14:44Z";

    fn scheduler(store: Arc<MockEventStore>) -> RefreshScheduler {
        let source = EventSource::new(store, "flowDB", Duration::from_secs(5));
        RefreshScheduler::new(source, SnapshotStore::new(), &RefreshConfig::default())
    }

    fn seeded_store() -> Arc<MockEventStore> {
        Arc::new(MockEventStore::with_events(
            vec![
                container_row(TS, "c1", "update", "10.0.0.1", ""),
                container_row(TS, "c2", "update", "10.0.0.2", ""),
            ],
            vec![flow_row(TS, "c1", "10.0.0.1", "c2", "10.0.0.2", "accept", "")],
        ))
    }

    #[test]
    fn test_interval_comes_from_config() {
        let source = EventSource::new(seeded_store(), "flowDB", Duration::from_secs(5));
        let config = RefreshConfig { interval_secs: 0 };
        let scheduler = RefreshScheduler::new(source, SnapshotStore::new(), &config);
        assert_eq!(scheduler.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_reader_starts_empty() {
        let store = SnapshotStore::new();
        let reader = store.reader();
        assert!(reader.current().is_empty());
        assert_eq!(reader.status().status(), "starting");
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let store = SnapshotStore::new();
        let reader = store.reader();
        let before = reader.current();
        store.publish(GraphSnapshot::default());
        assert!(!Arc::ptr_eq(&before, &reader.current()));
    }

    #[tokio::test]
    async fn test_refresh_once_publishes() {
        let store = seeded_store();
        let mut scheduler = scheduler(store.clone());
        let reader = scheduler.reader();

        scheduler.refresh_once().await.unwrap();

        let snapshot = reader.current();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.links.len(), 1);
        assert_eq!(reader.status().status(), "ok");
        assert_eq!(
            store.calls(),
            vec![CONTAINER_EVENTS_QUERY.to_string(), FLOW_EVENTS_QUERY.to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_snapshot() {
        let store = seeded_store();
        let mut scheduler = scheduler(store.clone());
        let reader = scheduler.reader();
        scheduler.refresh_once().await.unwrap();
        let published = reader.current();

        store.set_error(
            FLOW_EVENTS_QUERY,
            StoreError::Unreachable {
                message: "connection refused".into(),
            },
        );
        let err = scheduler.refresh_once().await.unwrap_err();
        assert!(matches!(err, TopographError::Store(StoreError::Unreachable { .. })));

        assert!(Arc::ptr_eq(&published, &reader.current()));
        let status = reader.status();
        assert_eq!(status.status(), "degraded");
        assert_eq!(status.cycles_failed, 1);
        assert_eq!(status.node_count, 2);
    }

    #[tokio::test]
    async fn test_container_query_failure_skips_flow_query() {
        let store = Arc::new(MockEventStore::new());
        store.set_error(
            CONTAINER_EVENTS_QUERY,
            StoreError::QueryRejected {
                message: "database not found".into(),
            },
        );
        let mut scheduler = scheduler(store.clone());
        assert!(scheduler.refresh_once().await.is_err());
        assert_eq!(store.calls(), vec![CONTAINER_EVENTS_QUERY.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_refreshes_immediately_and_stops_on_cancel() {
        let store = seeded_store();
        let scheduler = scheduler(store.clone());
        let mut reader = scheduler.reader();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(cancel.clone()));

        assert!(reader.changed().await);
        assert_eq!(reader.current().nodes.len(), 2);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(reader.status().cycles_started >= 2);

        cancel.cancel();
        handle.await.unwrap();
        while reader.changed().await {}
        assert!(reader.status().cycles_succeeded >= 2);
    }
}
