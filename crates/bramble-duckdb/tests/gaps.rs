use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use bramble_duckdb::DuckDbStore;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// Materialise a zero-count daily row by aggregating an empty day.
async fn seed_day_row(store: &DuckDbStore, site: &str, day: &str) {
    let d = date(day);
    let start = d.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let end = d.and_hms_opt(23, 59, 59).unwrap().and_utc();
    store.aggregate_days(site, start, end).await.expect("seed day");
}

#[tokio::test]
async fn missing_days_merge_into_consecutive_runs() {
    let store = DuckDbStore::open_in_memory().expect("db");
    store.create_site("Site", Some("dappled-fern-AB12CD")).await.expect("site");

    // Only Jan 4 has a row; the window is Jan 1 – Jan 5.
    seed_day_row(&store, "dappled-fern-AB12CD", "2026-01-04").await;

    let gaps = store
        .find_missing_days(
            "dappled-fern-AB12CD",
            utc(2026, 1, 1, 0, 0, 0),
            utc(2026, 1, 5, 12, 0, 0),
        )
        .await
        .expect("gaps");

    assert_eq!(
        gaps,
        vec![
            (date("2026-01-01"), date("2026-01-03")),
            (date("2026-01-05"), date("2026-01-05")),
        ]
    );
}

#[tokio::test]
async fn missing_days_plus_existing_rows_cover_the_window_exactly() {
    let store = DuckDbStore::open_in_memory().expect("db");
    store.create_site("Site", Some("hidden-brook-EF34GH")).await.expect("site");

    for day in ["2026-01-02", "2026-01-03", "2026-01-07"] {
        seed_day_row(&store, "hidden-brook-EF34GH", day).await;
    }

    let gaps = store
        .find_missing_days(
            "hidden-brook-EF34GH",
            utc(2026, 1, 1, 0, 0, 0),
            utc(2026, 1, 10, 12, 0, 0),
        )
        .await
        .expect("gaps");

    // Expand the ranges back into days and check the union + disjointness.
    let mut covered: Vec<NaiveDate> = Vec::new();
    for (start, end) in &gaps {
        let mut d = *start;
        while d <= *end {
            covered.push(d);
            d += chrono::Duration::days(1);
        }
    }
    let existing = [date("2026-01-02"), date("2026-01-03"), date("2026-01-07")];
    for day in &existing {
        assert!(!covered.contains(day), "existing day {day} reported missing");
    }
    assert_eq!(covered.len() + existing.len(), 10, "every day accounted for once");

    // Ranges are ascending and non-overlapping.
    for pair in gaps.windows(2) {
        assert!(pair[0].1 < pair[1].0);
    }
}

#[tokio::test]
async fn missing_hours_are_emitted_one_range_per_hour() {
    let store = DuckDbStore::open_in_memory().expect("db");
    store.create_site("Site", Some("rustling-oak-IJ56KL")).await.expect("site");

    // Rows exist for 11:00 and 13:00 only.
    for h in [11, 13] {
        store
            .aggregate_hours(
                "rustling-oak-IJ56KL",
                utc(2026, 1, 1, h, 0, 0),
                utc(2026, 1, 1, h, 59, 59),
            )
            .await
            .expect("seed hour");
    }

    let gaps = store
        .find_missing_hours(
            "rustling-oak-IJ56KL",
            utc(2026, 1, 1, 10, 0, 0),
            utc(2026, 1, 1, 15, 0, 0),
        )
        .await
        .expect("gaps");

    // Scattered hours stay unmerged; the 15:00 end bucket is excluded.
    assert_eq!(
        gaps,
        vec![
            (utc(2026, 1, 1, 10, 0, 0), utc(2026, 1, 1, 11, 0, 0)),
            (utc(2026, 1, 1, 12, 0, 0), utc(2026, 1, 1, 13, 0, 0)),
            (utc(2026, 1, 1, 14, 0, 0), utc(2026, 1, 1, 15, 0, 0)),
        ]
    );
}

#[tokio::test]
async fn backfilling_reported_gaps_clears_them() {
    let store = DuckDbStore::open_in_memory().expect("db");
    store.create_site("Site", Some("ancient-elm-MN78OP")).await.expect("site");

    let window = (utc(2026, 1, 1, 10, 0, 0), utc(2026, 1, 1, 14, 0, 0));
    let gaps = store
        .find_missing_hours("ancient-elm-MN78OP", window.0, window.1)
        .await
        .expect("gaps");
    assert_eq!(gaps.len(), 4);

    for (start, end) in gaps {
        store
            .aggregate_hours("ancient-elm-MN78OP", start, end)
            .await
            .expect("backfill");
    }

    let gaps = store
        .find_missing_hours("ancient-elm-MN78OP", window.0, window.1)
        .await
        .expect("gaps");
    assert!(gaps.is_empty());
}

#[tokio::test]
async fn gap_scan_rejects_unknown_site() {
    let store = DuckDbStore::open_in_memory().expect("db");
    let err = store
        .find_missing_days("nobody-home", utc(2026, 1, 1, 0, 0, 0), utc(2026, 1, 2, 0, 0, 0))
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("unknown site"));
}
