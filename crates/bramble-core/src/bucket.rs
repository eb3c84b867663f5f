//! Time-bucket arithmetic shared by the aggregator, the gap scanner and the
//! scheduler.
//!
//! All buckets are UTC. An hour bucket is identified by its hour-truncated
//! start timestamp, a day bucket by its calendar date.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Aggregation granularity. Exactly two widths exist; anything finer or
/// coarser is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

/// Counters returned by one aggregation run over one site-window.
///
/// `buckets_failed` is the in-result record of per-bucket errors: a failed
/// bucket is logged and counted here but never aborts the remaining buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub buckets_created: u64,
    pub buckets_updated: u64,
    pub pageviews_processed: u64,
    pub buckets_failed: u64,
}

impl AggregateStats {
    /// Fold another run's counters into this one (scheduler fan-out totals).
    pub fn absorb(&mut self, other: &AggregateStats) {
        self.buckets_created += other.buckets_created;
        self.buckets_updated += other.buckets_updated;
        self.pageviews_processed += other.pageviews_processed;
        self.buckets_failed += other.buckets_failed;
    }
}

/// Floor a timestamp to the start of its hour.
pub fn truncate_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    let secs = dt.timestamp();
    let floored = secs - secs.rem_euclid(3600);
    DateTime::from_timestamp(floored, 0).unwrap_or(dt)
}

/// The sequence of hour buckets covering `[start, end]`.
///
/// Callers pass arbitrary window bounds; alignment happens here. A
/// mid-bucket `end` includes its bucket (the "current hour" case), but an
/// exactly aligned `end` is treated as exclusive: `[14:00, 15:00]` covers
/// only the 14:00 bucket. A zero-width aligned window still covers the
/// bucket containing `start`.
pub fn hour_buckets(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let first = truncate_to_hour(start);
    let mut last = truncate_to_hour(end);
    if last == end && last > first {
        last -= Duration::hours(1);
    }

    let mut buckets = Vec::new();
    let mut current = first;
    while current <= last {
        buckets.push(current);
        current += Duration::hours(1);
    }
    buckets
}

/// The sequence of day buckets covering `[start, end]`, with the same
/// aligned-end-exclusive rule as [`hour_buckets`]: an `end` of exactly
/// midnight does not include that day (unless the window would otherwise be
/// empty).
pub fn day_buckets(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
    let first = start.date_naive();
    let mut last = end.date_naive();
    let last_midnight = last
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(end);
    if end == last_midnight && last > first {
        last -= Duration::days(1);
    }

    let mut buckets = Vec::new();
    let mut current = first;
    while current <= last {
        buckets.push(current);
        current += Duration::days(1);
    }
    buckets
}

/// Merge a set of days into maximal consecutive runs.
///
/// Input order does not matter. Output ranges are inclusive on both ends,
/// non-overlapping, and ascending. Used by the daily gap scanner so a long
/// outage becomes one backfill request instead of thirty.
pub fn merge_consecutive_days(days: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
    if days.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<NaiveDate> = days.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges = Vec::new();
    let mut run_start = sorted[0];
    let mut run_end = sorted[0];

    for &day in &sorted[1..] {
        if day == run_end + Duration::days(1) {
            run_end = day;
        } else {
            ranges.push((run_start, run_end));
            run_start = day;
            run_end = day;
        }
    }
    ranges.push((run_start, run_end));

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn truncate_to_hour_drops_minutes_and_seconds() {
        let dt = utc(2026, 3, 14, 14, 50, 59);
        assert_eq!(truncate_to_hour(dt), utc(2026, 3, 14, 14, 0, 0));
    }

    #[test]
    fn truncate_to_hour_is_identity_on_aligned_input() {
        let dt = utc(2026, 3, 14, 14, 0, 0);
        assert_eq!(truncate_to_hour(dt), dt);
    }

    #[test]
    fn hour_buckets_include_the_bucket_containing_a_midbucket_end() {
        let buckets = hour_buckets(utc(2026, 3, 14, 14, 5, 0), utc(2026, 3, 14, 16, 30, 0));
        assert_eq!(
            buckets,
            vec![
                utc(2026, 3, 14, 14, 0, 0),
                utc(2026, 3, 14, 15, 0, 0),
                utc(2026, 3, 14, 16, 0, 0),
            ]
        );
    }

    #[test]
    fn hour_buckets_aligned_end_is_exclusive() {
        // [14:00, 15:00] covers only the 14:00 bucket.
        let buckets = hour_buckets(utc(2026, 3, 14, 14, 0, 0), utc(2026, 3, 14, 15, 0, 0));
        assert_eq!(buckets, vec![utc(2026, 3, 14, 14, 0, 0)]);
    }

    #[test]
    fn hour_buckets_zero_width_window_covers_one_bucket() {
        let buckets = hour_buckets(utc(2026, 3, 14, 14, 0, 0), utc(2026, 3, 14, 14, 0, 0));
        assert_eq!(buckets, vec![utc(2026, 3, 14, 14, 0, 0)]);
    }

    #[test]
    fn day_buckets_midbucket_end_included() {
        let buckets = day_buckets(utc(2026, 1, 30, 12, 0, 0), utc(2026, 2, 2, 8, 0, 0));
        let expect: Vec<NaiveDate> = ["2026-01-30", "2026-01-31", "2026-02-01", "2026-02-02"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(buckets, expect);
    }

    #[test]
    fn day_buckets_midnight_end_is_exclusive() {
        let buckets = day_buckets(utc(2026, 1, 30, 0, 0, 0), utc(2026, 2, 1, 0, 0, 0));
        let expect: Vec<NaiveDate> = ["2026-01-30", "2026-01-31"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(buckets, expect);
    }

    #[test]
    fn merge_consecutive_days_splits_on_gap() {
        let d = |s: &str| s.parse::<NaiveDate>().unwrap();
        // Missing days {Jan 1, Jan 2, Jan 3, Jan 5} must merge to
        // [(Jan 1, Jan 3), (Jan 5, Jan 5)].
        let days = vec![
            d("2026-01-05"),
            d("2026-01-01"),
            d("2026-01-03"),
            d("2026-01-02"),
        ];
        assert_eq!(
            merge_consecutive_days(&days),
            vec![
                (d("2026-01-01"), d("2026-01-03")),
                (d("2026-01-05"), d("2026-01-05")),
            ]
        );
    }

    #[test]
    fn merge_consecutive_days_empty() {
        assert!(merge_consecutive_days(&[]).is_empty());
    }

    #[test]
    fn merge_consecutive_days_single_run() {
        let d = |s: &str| s.parse::<NaiveDate>().unwrap();
        let days = vec![d("2026-06-10"), d("2026-06-11")];
        assert_eq!(
            merge_consecutive_days(&days),
            vec![(d("2026-06-10"), d("2026-06-11"))]
        );
    }

    #[test]
    fn absorb_sums_all_counters() {
        let mut a = AggregateStats {
            buckets_created: 1,
            buckets_updated: 2,
            pageviews_processed: 10,
            buckets_failed: 0,
        };
        a.absorb(&AggregateStats {
            buckets_created: 3,
            buckets_updated: 0,
            pageviews_processed: 4,
            buckets_failed: 1,
        });
        assert_eq!(a.buckets_created, 4);
        assert_eq!(a.buckets_updated, 2);
        assert_eq!(a.pageviews_processed, 14);
        assert_eq!(a.buckets_failed, 1);
    }
}
