//! The bucket aggregator: incremental, idempotent rollups of raw pageviews
//! into (site, time-bucket) counter rows.
//!
//! Each bucket is processed as one transaction: load-or-create the aggregate
//! row, fold in only the pageviews past the row's watermark, recompute the
//! distinct-session count over the full bucket range, advance the watermark.
//! Repeat runs with no new pageviews change nothing. A failing bucket is
//! logged and counted but never blocks the remaining buckets in the window.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use bramble_core::bucket::{day_buckets, hour_buckets, AggregateStats};
use bramble_core::error::CoreError;

use crate::backend::{ts_param, DuckDbStore};

struct BucketOutcome {
    created: bool,
    pageviews: u64,
}

impl DuckDbStore {
    /// Aggregate hourly buckets for `site_identifier` over `[start, end]`.
    ///
    /// Window bounds need not be hour-aligned; every hour bucket touching the
    /// window is processed. An exactly hour-aligned `end` is exclusive, so
    /// `[14:00, 15:00]` touches only the 14:00 bucket.
    pub async fn aggregate_hours(
        &self,
        site_identifier: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AggregateStats> {
        if start > end {
            return Err(CoreError::InvalidWindow { start, end }.into());
        }
        let site_id = self.require_site(site_identifier).await?;

        let mut stats = AggregateStats::default();
        for bucket in hour_buckets(start, end) {
            let outcome = self
                .aggregate_bucket(
                    &site_id,
                    "hourly_bucket_stats",
                    &ts_param(bucket),
                    &ts_param(bucket),
                    &ts_param(bucket + Duration::hours(1)),
                )
                .await;
            record_outcome(&mut stats, outcome, site_identifier, &bucket.to_rfc3339());
        }

        tracing::info!(
            site = %site_identifier,
            created = stats.buckets_created,
            updated = stats.buckets_updated,
            pageviews = stats.pageviews_processed,
            failed = stats.buckets_failed,
            "hourly aggregation complete"
        );
        Ok(stats)
    }

    /// Aggregate daily buckets for `site_identifier` over `[start, end]`.
    ///
    /// Bounds are aligned to calendar days (UTC) internally.
    pub async fn aggregate_days(
        &self,
        site_identifier: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AggregateStats> {
        if start > end {
            return Err(CoreError::InvalidWindow { start, end }.into());
        }
        let site_id = self.require_site(site_identifier).await?;

        let mut stats = AggregateStats::default();
        for day in day_buckets(start, end) {
            let outcome = self
                .aggregate_bucket(
                    &site_id,
                    "daily_bucket_stats",
                    &day.format("%Y-%m-%d").to_string(),
                    &day_range_start(day),
                    &day_range_start(day + Duration::days(1)),
                )
                .await;
            record_outcome(&mut stats, outcome, site_identifier, &day.to_string());
        }

        tracing::info!(
            site = %site_identifier,
            created = stats.buckets_created,
            updated = stats.buckets_updated,
            pageviews = stats.pageviews_processed,
            failed = stats.buckets_failed,
            "daily aggregation complete"
        );
        Ok(stats)
    }

    /// Process a single bucket inside one transaction.
    ///
    /// `bucket_key` is the value stored in `bucket_start` (timestamp string
    /// for hourly, date string for daily); `range_start`/`range_end` bound
    /// the half-open pageview scan `[range_start, range_end)`.
    async fn aggregate_bucket(
        &self,
        site_id: &str,
        table: &'static str,
        bucket_key: &str,
        range_start: &str,
        range_end: &str,
    ) -> Result<BucketOutcome> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = ts_param(Utc::now());

        // Load or create the aggregate row. Creation happens even when the
        // bucket turns out to hold zero pageviews: the gap scanner reads row
        // existence as "already aggregated".
        let existing: Option<(String, Option<String>)> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT id, last_processed_pageview_id FROM {table} \
                 WHERE site_id = ?1 AND bucket_start = ?2"
            ))?;
            match stmt.query_row(duckdb::params![site_id, bucket_key], |row| {
                Ok((row.get(0)?, row.get(1)?))
            }) {
                Ok(row) => Some(row),
                Err(duckdb::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            }
        };

        let (row_id, watermark_id, created) = match existing {
            Some((id, watermark)) => (id, watermark, false),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    &format!(
                        "INSERT INTO {table} (id, site_id, bucket_start, pageview_count, \
                         unique_session_count, last_processed_pageview_id, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, 0, 0, NULL, ?4, ?4)"
                    ),
                    duckdb::params![id, site_id, bucket_key, now],
                )?;
                (id, None, true)
            }
        };

        // A watermark restricts the scan to pageviews created strictly after
        // the last one already folded in. The watermark row itself carries
        // the cutoff timestamp. Pageviews are never deleted, so a dangling
        // watermark means the event table was tampered with; rescanning would
        // double-count everything already folded in, so the bucket fails and
        // is counted in `buckets_failed` instead.
        let watermark_ts: Option<String> = match &watermark_id {
            Some(watermark) => {
                let mut stmt = tx
                    .prepare("SELECT CAST(created_at AS VARCHAR) FROM page_views WHERE id = ?1")?;
                match stmt.query_row(duckdb::params![watermark], |row| row.get(0)) {
                    Ok(ts) => Some(ts),
                    Err(duckdb::Error::QueryReturnedNoRows) => {
                        return Err(anyhow::anyhow!(
                            "watermark pageview {watermark} not found for bucket {bucket_key}"
                        ));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => None,
        };

        let new_ids: Vec<String> = {
            let mut sql = "SELECT id FROM page_views WHERE site_id = ?1 \
                           AND created_at >= ?2 AND created_at < ?3"
                .to_string();
            let mut params: Vec<Box<dyn duckdb::types::ToSql>> = vec![
                Box::new(site_id.to_string()),
                Box::new(range_start.to_string()),
                Box::new(range_end.to_string()),
            ];
            if let Some(cutoff) = &watermark_ts {
                sql.push_str(" AND created_at > ?4");
                params.push(Box::new(cutoff.clone()));
            }
            sql.push_str(" ORDER BY created_at");

            let param_refs: Vec<&dyn duckdb::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };

        if new_ids.is_empty() {
            // Nothing new: the row (possibly just created, all-zero) stays as
            // is. A no-op rerun must not count as an update.
            tx.commit()?;
            return Ok(BucketOutcome {
                created,
                pageviews: 0,
            });
        }

        // Distinct sessions are recomputed over the FULL bucket range, not
        // just the newly selected pageviews: a session seen in a prior run
        // may gain pageviews in this one and must still count exactly once.
        let unique_sessions: i64 = {
            let mut stmt = tx.prepare(
                "SELECT COUNT(DISTINCT session_id) FROM page_views \
                 WHERE site_id = ?1 AND created_at >= ?2 AND created_at < ?3 \
                 AND session_id IS NOT NULL",
            )?;
            stmt.query_row(duckdb::params![site_id, range_start, range_end], |row| {
                row.get(0)
            })?
        };

        let last_id = new_ids.last().cloned().unwrap_or_default();

        tx.execute(
            &format!(
                "UPDATE {table} SET pageview_count = pageview_count + ?1, \
                 unique_session_count = ?2, last_processed_pageview_id = ?3, \
                 updated_at = ?4 WHERE id = ?5"
            ),
            duckdb::params![new_ids.len() as i64, unique_sessions, last_id, now, row_id],
        )?;
        tx.commit()?;

        Ok(BucketOutcome {
            created,
            pageviews: new_ids.len() as u64,
        })
    }
}

fn day_range_start(day: NaiveDate) -> String {
    format!("{} 00:00:00.000000", day.format("%Y-%m-%d"))
}

/// Fold one bucket's result into the run counters. Errors are logged with
/// the bucket identity and counted; they never abort the window.
fn record_outcome(
    stats: &mut AggregateStats,
    outcome: Result<BucketOutcome>,
    site_identifier: &str,
    bucket_label: &str,
) {
    match outcome {
        Ok(outcome) => {
            stats.pageviews_processed += outcome.pageviews;
            if outcome.created {
                stats.buckets_created += 1;
            } else if outcome.pageviews > 0 {
                stats.buckets_updated += 1;
            }
        }
        Err(err) => {
            tracing::error!(
                site = %site_identifier,
                bucket = %bucket_label,
                error = %err,
                "bucket aggregation failed"
            );
            stats.buckets_failed += 1;
        }
    }
}
