use chrono::{DateTime, TimeZone, Utc};

use bramble_core::pageview::PageView;
use bramble_core::session::session_key;
use bramble_duckdb::DuckDbStore;

fn utc(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, h, mi, s).single().unwrap()
}

fn raw_pv(site_id: &str, ip_hash: &str, path: &str, at: DateTime<Utc>) -> PageView {
    PageView {
        id: uuid::Uuid::new_v4().to_string(),
        site_id: site_id.to_string(),
        session_id: None,
        url: format!("https://example.com{path}"),
        path: path.to_string(),
        referrer: Some("https://news.ycombinator.com/".to_string()),
        referrer_domain: Some("news.ycombinator.com".to_string()),
        ip_hash: ip_hash.to_string(),
        user_agent: "Mozilla/5.0".to_string(),
        browser: Some("Firefox".to_string()),
        browser_version: None,
        operating_system: Some("Linux".to_string()),
        device_type: Some("desktop".to_string()),
        country: None,
        region: None,
        city: None,
        is_processed: false,
        created_at: at,
    }
}

#[tokio::test]
async fn sweep_groups_pageviews_in_the_same_window() {
    let store = DuckDbStore::open_in_memory().expect("db");
    let site_id = store.create_site("Site", Some("verdant-owl-AB12CD")).await.expect("site");

    store
        .insert_page_views(&[
            raw_pv(&site_id, "ip-a", "/landing", utc(10, 0, 0)),
            raw_pv(&site_id, "ip-a", "/pricing", utc(10, 10, 0)),
        ])
        .await
        .expect("insert");

    let processed = store.process_pending_sessions(100).await.expect("sweep");
    assert_eq!(processed, 2);

    let key = session_key("ip-a", "Mozilla/5.0", utc(10, 0, 0));
    let session = store
        .session_by_key(&key)
        .await
        .expect("read")
        .expect("session");
    assert_eq!(session.page_view_count, 2);
    assert!(!session.is_bounce);
    assert_eq!(session.duration, 600);
    assert_eq!(session.enter_page, "/landing");
    assert_eq!(session.exit_page.as_deref(), Some("/pricing"));
    assert_eq!(session.referrer_domain.as_deref(), Some("news.ycombinator.com"));

    // Nothing left for the next sweep.
    let processed = store.process_pending_sessions(100).await.expect("sweep");
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn window_boundary_splits_into_two_sessions() {
    let store = DuckDbStore::open_in_memory().expect("db");
    let site_id = store.create_site("Site", Some("shadowy-fox-EF34GH")).await.expect("site");

    // 10:29:59 and 10:30:01 straddle the half-hour boundary.
    store
        .insert_page_views(&[
            raw_pv(&site_id, "ip-a", "/a", utc(10, 29, 59)),
            raw_pv(&site_id, "ip-a", "/b", utc(10, 30, 1)),
        ])
        .await
        .expect("insert");

    store.process_pending_sessions(100).await.expect("sweep");

    let first = store
        .session_by_key(&session_key("ip-a", "Mozilla/5.0", utc(10, 29, 59)))
        .await
        .expect("read")
        .expect("first session");
    let second = store
        .session_by_key(&session_key("ip-a", "Mozilla/5.0", utc(10, 30, 1)))
        .await
        .expect("read")
        .expect("second session");

    assert_ne!(first.id, second.id);
    assert_eq!(first.page_view_count, 1);
    assert_eq!(second.page_view_count, 1);
    assert!(first.is_bounce);
    assert!(second.is_bounce);
}

#[tokio::test]
async fn single_pageview_session_is_a_bounce() {
    let store = DuckDbStore::open_in_memory().expect("db");
    let site_id = store.create_site("Site", Some("gentle-wren-IJ56KL")).await.expect("site");

    store
        .insert_page_views(&[raw_pv(&site_id, "ip-z", "/only", utc(9, 15, 0))])
        .await
        .expect("insert");
    store.process_pending_sessions(100).await.expect("sweep");

    let session = store
        .session_by_key(&session_key("ip-z", "Mozilla/5.0", utc(9, 15, 0)))
        .await
        .expect("read")
        .expect("session");
    assert!(session.is_bounce);
    assert_eq!(session.page_view_count, 1);
    assert_eq!(session.duration, 0);
    assert_eq!(session.enter_page, "/only");
    assert_eq!(session.exit_page, None);
}

#[tokio::test]
async fn different_visitors_get_different_sessions() {
    let store = DuckDbStore::open_in_memory().expect("db");
    let site_id = store.create_site("Site", Some("sparkling-jay-MN78OP")).await.expect("site");

    store
        .insert_page_views(&[
            raw_pv(&site_id, "ip-a", "/", utc(11, 0, 0)),
            raw_pv(&site_id, "ip-b", "/", utc(11, 1, 0)),
        ])
        .await
        .expect("insert");
    store.process_pending_sessions(100).await.expect("sweep");

    let a = store
        .session_by_key(&session_key("ip-a", "Mozilla/5.0", utc(11, 0, 0)))
        .await
        .expect("read")
        .expect("a");
    let b = store
        .session_by_key(&session_key("ip-b", "Mozilla/5.0", utc(11, 1, 0)))
        .await
        .expect("read")
        .expect("b");
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn sweep_feeds_unique_session_counts() {
    let store = DuckDbStore::open_in_memory().expect("db");
    let site_id = store.create_site("Site", Some("eternal-moss-QR90ST")).await.expect("site");

    // Two visitors in the same hour, one of them with two pageviews.
    store
        .insert_page_views(&[
            raw_pv(&site_id, "ip-a", "/x", utc(14, 5, 0)),
            raw_pv(&site_id, "ip-a", "/y", utc(14, 20, 0)),
            raw_pv(&site_id, "ip-b", "/z", utc(14, 50, 0)),
        ])
        .await
        .expect("insert");

    store.process_pending_sessions(100).await.expect("sweep");
    store
        .aggregate_hours("eternal-moss-QR90ST", utc(14, 0, 0), utc(15, 0, 0))
        .await
        .expect("aggregate");

    let row = store
        .hourly_stats("eternal-moss-QR90ST", utc(14, 0, 0))
        .await
        .expect("read")
        .expect("row");
    assert_eq!(row.pageview_count, 3);
    assert_eq!(row.unique_session_count, 2);
}

#[tokio::test]
async fn sweep_respects_the_batch_limit() {
    let store = DuckDbStore::open_in_memory().expect("db");
    let site_id = store.create_site("Site", Some("roaming-deer-UV12WX")).await.expect("site");

    store
        .insert_page_views(&[
            raw_pv(&site_id, "ip-a", "/1", utc(8, 0, 0)),
            raw_pv(&site_id, "ip-a", "/2", utc(8, 1, 0)),
            raw_pv(&site_id, "ip-a", "/3", utc(8, 2, 0)),
        ])
        .await
        .expect("insert");

    assert_eq!(store.process_pending_sessions(2).await.expect("sweep"), 2);
    assert_eq!(store.process_pending_sessions(2).await.expect("sweep"), 1);
    assert_eq!(store.process_pending_sessions(2).await.expect("sweep"), 0);
}
