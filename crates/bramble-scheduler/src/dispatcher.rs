//! Aggregation request dispatch.
//!
//! The core never assumes a transport: the scheduler talks to a
//! [`Dispatcher`]. The variant (run inline on the caller's task, or hand
//! off to a queued worker) is selected once at startup from configuration,
//! never re-probed per call.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use bramble_core::bucket::{AggregateStats, Granularity};
use bramble_duckdb::DuckDbStore;

/// One site-scoped aggregation unit of work. Serializable so a queued
/// transport can carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub site: String,
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Run one request against the store. Shared by both dispatcher variants.
pub async fn execute_request(
    store: &DuckDbStore,
    req: &AggregationRequest,
) -> Result<AggregateStats> {
    match req.granularity {
        Granularity::Hour => store.aggregate_hours(&req.site, req.start, req.end).await,
        Granularity::Day => store.aggregate_days(&req.site, req.start, req.end).await,
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, req: AggregationRequest) -> Result<()>;
}

/// Runs every request to completion on the caller's task.
pub struct InlineDispatcher {
    store: Arc<DuckDbStore>,
}

impl InlineDispatcher {
    pub fn new(store: Arc<DuckDbStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Dispatcher for InlineDispatcher {
    async fn dispatch(&self, req: AggregationRequest) -> Result<()> {
        let stats = execute_request(&self.store, &req).await?;
        if stats.buckets_failed > 0 {
            error!(
                site = %req.site,
                granularity = req.granularity.as_str(),
                failed = stats.buckets_failed,
                "aggregation finished with failed buckets"
            );
        }
        Ok(())
    }
}

/// Hands requests to a bounded channel consumed by [`run_worker_loop`].
///
/// Dispatch succeeds once the request is enqueued; execution outcome is
/// reported by the worker's own logs. Backpressure is the channel bound:
/// a full queue blocks the scheduler tick rather than dropping work.
pub struct QueuedDispatcher {
    tx: mpsc::Sender<AggregationRequest>,
}

impl QueuedDispatcher {
    /// Create the dispatcher and the receiving end for the worker loop.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AggregationRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Dispatcher for QueuedDispatcher {
    async fn dispatch(&self, req: AggregationRequest) -> Result<()> {
        self.tx
            .send(req)
            .await
            .map_err(|e| anyhow::anyhow!("aggregation queue closed: {e}"))
    }
}

/// Consume queued requests until every sender is dropped.
///
/// Request failures are logged and swallowed; the gap scanner re-emits any
/// window that never produced aggregate rows, so a lost request heals on the
/// next backfill pass.
pub async fn run_worker_loop(store: Arc<DuckDbStore>, mut rx: mpsc::Receiver<AggregationRequest>) {
    info!("aggregation worker started");
    while let Some(req) = rx.recv().await {
        match execute_request(&store, &req).await {
            Ok(stats) => {
                tracing::debug!(
                    site = %req.site,
                    granularity = req.granularity.as_str(),
                    created = stats.buckets_created,
                    updated = stats.buckets_updated,
                    "aggregation request done"
                );
            }
            Err(err) => {
                error!(
                    site = %req.site,
                    granularity = req.granularity.as_str(),
                    error = %err,
                    "aggregation request failed"
                );
            }
        }
    }
    info!("aggregation worker stopped");
}
