//! Cadence loops: current-hour and current-day aggregation, the periodic
//! backfill scan, and the session catch-up sweep.
//!
//! Every invocation is independent and site-scoped; a failed or cancelled
//! pass leaves committed buckets valid and the next tick (or the gap
//! scanner) picks up the rest.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::time::Instant;
use tracing::{error, info};

use bramble_core::bucket::{truncate_to_hour, Granularity};
use bramble_core::config::Config;
use bramble_duckdb::DuckDbStore;

use crate::dispatcher::{AggregationRequest, Dispatcher};
use crate::telemetry::Telemetry;

/// "Last N hours back from now" convenience window.
pub fn last_hours_window(n: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    (now - Duration::hours(n), now)
}

/// "Last N days back from now" convenience window.
pub fn last_days_window(n: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    (now - Duration::days(n), now)
}

pub struct Scheduler {
    store: Arc<DuckDbStore>,
    dispatcher: Arc<dyn Dispatcher>,
    cfg: Config,
    // Holding the handle makes "logging is initialised" a construction-time
    // requirement instead of ambient global state.
    _telemetry: Arc<Telemetry>,
}

impl Scheduler {
    pub fn new(
        store: Arc<DuckDbStore>,
        dispatcher: Arc<dyn Dispatcher>,
        cfg: Config,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            cfg,
            _telemetry: telemetry,
        }
    }

    /// Dispatch a current-hour aggregation request for every site.
    /// Run on every tick.
    pub async fn dispatch_current_hour(&self) -> Result<usize> {
        let now = Utc::now();
        let hour_start = truncate_to_hour(now);
        let mut dispatched = 0;
        for site in self.store.list_site_identifiers().await? {
            self.dispatcher
                .dispatch(AggregationRequest {
                    site,
                    granularity: Granularity::Hour,
                    start: hour_start,
                    end: now,
                })
                .await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Dispatch a current-day aggregation request for every site.
    /// Run once per calendar day.
    pub async fn dispatch_current_day(&self) -> Result<usize> {
        let now = Utc::now();
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);
        let mut dispatched = 0;
        for site in self.store.list_site_identifiers().await? {
            self.dispatcher
                .dispatch(AggregationRequest {
                    site,
                    granularity: Granularity::Day,
                    start: day_start,
                    end: now,
                })
                .await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Scan for buckets with no aggregate row and dispatch one request per
    /// gap: unmerged one-hour ranges over the hourly window, merged
    /// consecutive-day runs over the daily window.
    pub async fn dispatch_backfill(&self) -> Result<usize> {
        let (hour_start, hour_end) = last_days_window(self.cfg.backfill_hour_days);
        let (day_start, day_end) = last_days_window(self.cfg.backfill_day_days);
        let mut dispatched = 0;

        for site in self.store.list_site_identifiers().await? {
            let missing_hours = self
                .store
                .find_missing_hours(&site, hour_start, hour_end)
                .await?;
            for (start, end) in missing_hours {
                self.dispatcher
                    .dispatch(AggregationRequest {
                        site: site.clone(),
                        granularity: Granularity::Hour,
                        start,
                        end,
                    })
                    .await?;
                dispatched += 1;
            }

            let missing_days = self
                .store
                .find_missing_days(&site, day_start, day_end)
                .await?;
            for (first, last) in missing_days {
                self.dispatcher
                    .dispatch(AggregationRequest {
                        site: site.clone(),
                        granularity: Granularity::Day,
                        start: midnight(first),
                        end: end_of_day(last),
                    })
                    .await?;
                dispatched += 1;
            }
        }

        if dispatched > 0 {
            info!(dispatched, "backfill requests queued");
        }
        Ok(dispatched)
    }

    /// One tick's worth of work: session sweep, then current-hour fan-out.
    pub async fn tick(&self) -> Result<()> {
        self.store
            .process_pending_sessions(self.cfg.session_sweep_batch)
            .await?;
        self.dispatch_current_hour().await?;
        Ok(())
    }

    /// Run forever on the configured cadences. A failing pass is logged and
    /// retried on the next tick; the store owns idempotence, so retries are
    /// always safe.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.cfg.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            tick_seconds = self.cfg.tick_seconds,
            backfill_seconds = self.cfg.backfill_interval_seconds,
            "scheduler started"
        );

        let mut last_day_dispatch: Option<NaiveDate> = None;
        let mut last_backfill = Instant::now();

        loop {
            interval.tick().await;

            if let Err(err) = self.tick().await {
                error!(error = %err, "scheduler tick failed");
            }

            let today = Utc::now().date_naive();
            if last_day_dispatch != Some(today) {
                match self.dispatch_current_day().await {
                    Ok(_) => last_day_dispatch = Some(today),
                    Err(err) => error!(error = %err, "current-day dispatch failed"),
                }
            }

            if last_backfill.elapsed() >= StdDuration::from_secs(self.cfg.backfill_interval_seconds)
            {
                match self.dispatch_backfill().await {
                    Ok(_) => last_backfill = Instant::now(),
                    Err(err) => error!(error = %err, "backfill dispatch failed"),
                }
            }
        }
    }
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}
