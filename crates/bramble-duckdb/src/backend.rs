use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use bramble_core::pageview::{extract_referrer_domain, path_from_url, PageView};
use bramble_core::session::Session;
use bramble_core::site::generate_identifier;

use crate::schema::init_sql;

/// A DuckDB store for Bramble.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. We wrap the connection in `Arc<Mutex<_>>` so the async
/// runtime serialises writes while the struct stays cheaply cloneable. The
/// mutex also gives every per-bucket transaction at-most-one-writer
/// semantics: two aggregation runs for the same (site, bucket) cannot read
/// the same watermark concurrently.
#[derive(Clone)]
pub struct DuckDbStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

/// Aggregate row as read back from either stats table.
#[derive(Debug, Clone)]
pub struct BucketStats {
    pub pageview_count: i64,
    pub unique_session_count: i64,
    pub last_processed_pageview_id: Option<String>,
}

impl DuckDbStore {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`,
    /// read from `Config.duckdb_memory_limit` at the call site. Runs the
    /// schema init SQL so all tables and indexes exist.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for tests only; data is discarded when the struct is
    /// dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    ///
    /// Returns an error if the connection is unavailable (file locked, disk
    /// full, etc.), the store-wide failure case that aborts a whole run.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Create a site row and return its internal id.
    ///
    /// Site management proper is an external concern; this exists for
    /// fixtures and bootstrap seeding. When `identifier` is `None` a fresh
    /// woodland identifier is generated, retrying on the (unlikely)
    /// collision. Safe to call repeatedly with the same identifier.
    pub async fn create_site(&self, name: &str, identifier: Option<&str>) -> Result<String> {
        let conn = self.conn.lock().await;
        let identifier = match identifier {
            Some(ident) => ident.to_string(),
            None => loop {
                let candidate = generate_identifier();
                let mut stmt =
                    conn.prepare("SELECT count(*) FROM sites WHERE identifier = ?1")?;
                let taken: i64 =
                    stmt.query_row(duckdb::params![candidate], |row| row.get(0))?;
                if taken == 0 {
                    break candidate;
                }
            },
        };
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO sites (id, name, identifier) VALUES (?1, ?2, ?3) \
             ON CONFLICT (identifier) DO NOTHING",
            duckdb::params![id, name, identifier],
        )?;
        let mut stmt = conn.prepare("SELECT id FROM sites WHERE identifier = ?1")?;
        let id: String = stmt.query_row(duckdb::params![identifier], |row| row.get(0))?;
        Ok(id)
    }

    /// Resolve a public site identifier to the internal site id.
    pub async fn site_id_for(&self, identifier: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id FROM sites WHERE identifier = ?1")?;
        let id = stmt
            .query_row(duckdb::params![identifier], |row| row.get(0))
            .ok();
        Ok(id)
    }

    /// All site identifiers, for scheduler fan-out.
    pub async fn list_site_identifiers(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT identifier FROM sites ORDER BY identifier")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut identifiers = Vec::new();
        for row in rows {
            identifiers.push(row?);
        }
        Ok(identifiers)
    }

    /// Insert a batch of pageviews in a single transaction.
    ///
    /// Called by the ingestion collaborator (and test fixtures). Fields the
    /// caller left unset are derived on the way in: an empty `path` from the
    /// URL, a missing `referrer_domain` from the referrer. Returns
    /// immediately if `page_views` is empty.
    pub async fn insert_page_views(&self, page_views: &[PageView]) -> Result<()> {
        if page_views.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for pv in page_views {
            let path = if pv.path.is_empty() {
                path_from_url(&pv.url)
            } else {
                pv.path.clone()
            };
            let referrer_domain = pv
                .referrer_domain
                .clone()
                .or_else(|| pv.referrer.as_deref().and_then(extract_referrer_domain));
            tx.execute(
                r#"INSERT INTO page_views (
                    id, site_id, session_id,
                    url, path, referrer, referrer_domain,
                    ip_hash, user_agent,
                    browser, browser_version, operating_system, device_type,
                    country, region, city,
                    is_processed, created_at
                ) VALUES (
                    ?1,  ?2,  ?3,
                    ?4,  ?5,  ?6,  ?7,
                    ?8,  ?9,
                    ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16,
                    ?17, ?18
                )"#,
                duckdb::params![
                    pv.id,
                    pv.site_id,
                    pv.session_id,
                    pv.url,
                    path,
                    pv.referrer,
                    referrer_domain,
                    pv.ip_hash,
                    pv.user_agent,
                    pv.browser,
                    pv.browser_version,
                    pv.operating_system,
                    pv.device_type,
                    pv.country,
                    pv.region,
                    pv.city,
                    pv.is_processed,
                    ts_param(pv.created_at),
                ],
            )?;
        }
        tx.commit()?;
        tracing::debug!("Inserted {} pageviews", page_views.len());
        Ok(())
    }

    /// Read back an hourly aggregate row, if one exists.
    pub async fn hourly_stats(
        &self,
        site_identifier: &str,
        bucket_start: DateTime<Utc>,
    ) -> Result<Option<BucketStats>> {
        let site_id = self.require_site(site_identifier).await?;
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT pageview_count, unique_session_count, last_processed_pageview_id \
             FROM hourly_bucket_stats WHERE site_id = ?1 AND bucket_start = ?2",
        )?;
        let row = stmt
            .query_row(
                duckdb::params![site_id, ts_param(bucket_start)],
                |row| {
                    Ok(BucketStats {
                        pageview_count: row.get(0)?,
                        unique_session_count: row.get(1)?,
                        last_processed_pageview_id: row.get(2)?,
                    })
                },
            )
            .ok();
        Ok(row)
    }

    /// Read back a daily aggregate row, if one exists.
    pub async fn daily_stats(
        &self,
        site_identifier: &str,
        bucket_start: chrono::NaiveDate,
    ) -> Result<Option<BucketStats>> {
        let site_id = self.require_site(site_identifier).await?;
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT pageview_count, unique_session_count, last_processed_pageview_id \
             FROM daily_bucket_stats WHERE site_id = ?1 AND bucket_start = ?2",
        )?;
        let row = stmt
            .query_row(
                duckdb::params![site_id, bucket_start.format("%Y-%m-%d").to_string()],
                |row| {
                    Ok(BucketStats {
                        pageview_count: row.get(0)?,
                        unique_session_count: row.get(1)?,
                        last_processed_pageview_id: row.get(2)?,
                    })
                },
            )
            .ok();
        Ok(row)
    }

    /// Read back a session by its deterministic key.
    pub async fn session_by_key(&self, session_key: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, site_id, session_key, is_bounce, duration, page_view_count, \
                    referrer, referrer_domain, enter_page, exit_page, \
                    CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR) \
             FROM sessions WHERE session_key = ?1",
        )?;
        let raw = stmt
            .query_row(duckdb::params![session_key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, String>(11)?,
                ))
            })
            .ok();

        match raw {
            None => Ok(None),
            Some((
                id,
                site_id,
                session_key,
                is_bounce,
                duration,
                page_view_count,
                referrer,
                referrer_domain,
                enter_page,
                exit_page,
                created_raw,
                updated_raw,
            )) => Ok(Some(Session {
                id,
                site_id,
                session_key,
                is_bounce,
                duration,
                page_view_count,
                referrer,
                referrer_domain,
                enter_page,
                exit_page,
                created_at: parse_ts(&created_raw)?,
                updated_at: parse_ts(&updated_raw)?,
            })),
        }
    }

    /// Resolve a site identifier or fail with `CoreError::UnknownSite`.
    pub(crate) async fn require_site(&self, identifier: &str) -> Result<String> {
        self.site_id_for(identifier).await?.ok_or_else(|| {
            bramble_core::error::CoreError::UnknownSite(identifier.to_string()).into()
        })
    }

    /// Acquire the connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Format a timestamp for use as a DuckDB TIMESTAMP parameter.
///
/// DuckDB implicitly casts VARCHAR parameters when compared against
/// TIMESTAMP columns, so all timestamp params travel as strings in this
/// fixed format.
pub(crate) fn ts_param(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse a timestamp read back via `CAST(col AS VARCHAR)`.
///
/// DuckDB prints whole-second values without a fractional part, so both
/// shapes are accepted.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))?;
    Ok(naive.and_utc())
}
