//! The gap scanner: find buckets in a window that have no aggregate row yet.
//!
//! Daily gaps are merged into maximal consecutive runs so an outage becomes
//! one backfill request. Hourly gaps are deliberately NOT merged: they are
//! expected to be sparse and scattered, and one-hour requests keep dispatch
//! semantics trivial at the cost of a larger fan-out.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use bramble_core::bucket::{merge_consecutive_days, truncate_to_hour};
use bramble_core::error::CoreError;

use crate::backend::{parse_ts, ts_param, DuckDbStore};

impl DuckDbStore {
    /// Hour buckets in `[start, end)` (after hour alignment) that have no
    /// `hourly_bucket_stats` row.
    ///
    /// Each missing hour is returned as its own `(start, start + 1h)` range,
    /// ascending. The bucket containing `end` is excluded: the caller's
    /// window end is "now" and the current hour is still being written by
    /// the cadence aggregation.
    pub async fn find_missing_hours(
        &self,
        site_identifier: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        if start > end {
            return Err(CoreError::InvalidWindow { start, end }.into());
        }
        let site_id = self.require_site(site_identifier).await?;

        let window_start = truncate_to_hour(start);
        let window_end = truncate_to_hour(end);

        let existing: HashSet<DateTime<Utc>> = {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(
                "SELECT CAST(bucket_start AS VARCHAR) FROM hourly_bucket_stats \
                 WHERE site_id = ?1 AND bucket_start >= ?2 AND bucket_start < ?3",
            )?;
            let rows = stmt.query_map(
                duckdb::params![site_id, ts_param(window_start), ts_param(window_end)],
                |row| row.get::<_, String>(0),
            )?;
            let mut set = HashSet::new();
            for row in rows {
                set.insert(parse_ts(&row?)?);
            }
            set
        };

        let mut missing = Vec::new();
        let mut current = window_start;
        while current < window_end {
            if !existing.contains(&current) {
                missing.push((current, current + Duration::hours(1)));
            }
            current += Duration::hours(1);
        }
        Ok(missing)
    }

    /// Calendar days in `[start, end]` (inclusive, UTC) that have no
    /// `daily_bucket_stats` row, merged into maximal consecutive runs.
    ///
    /// Returned ranges are inclusive on both ends, non-overlapping and
    /// ascending; re-running each through the daily aggregator covers every
    /// previously row-less day in the window.
    pub async fn find_missing_days(
        &self,
        site_identifier: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(NaiveDate, NaiveDate)>> {
        if start > end {
            return Err(CoreError::InvalidWindow { start, end }.into());
        }
        let site_id = self.require_site(site_identifier).await?;

        let start_date = start.date_naive();
        let end_date = end.date_naive();

        let existing: HashSet<NaiveDate> = {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(
                "SELECT CAST(bucket_start AS VARCHAR) FROM daily_bucket_stats \
                 WHERE site_id = ?1 AND bucket_start >= ?2 AND bucket_start <= ?3",
            )?;
            let rows = stmt.query_map(
                duckdb::params![
                    site_id,
                    start_date.format("%Y-%m-%d").to_string(),
                    end_date.format("%Y-%m-%d").to_string()
                ],
                |row| row.get::<_, String>(0),
            )?;
            let mut set = HashSet::new();
            for row in rows {
                let raw: String = row?;
                // DATE casts to "YYYY-MM-DD"; a TIMESTAMP-shaped value would
                // carry a time suffix, so take the date prefix.
                let date: NaiveDate = raw
                    .get(..10)
                    .unwrap_or(&raw)
                    .parse()
                    .map_err(|e| anyhow::anyhow!("bad bucket_start {raw:?}: {e}"))?;
                set.insert(date);
            }
            set
        };

        let mut missing = Vec::new();
        let mut current = start_date;
        while current <= end_date {
            if !existing.contains(&current) {
                missing.push(current);
            }
            current += Duration::days(1);
        }

        Ok(merge_consecutive_days(&missing))
    }
}
