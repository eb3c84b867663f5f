//! The session resolver: assigns pageviews to derived sessions and keeps the
//! session roll-up fields current.
//!
//! Runs as a catch-up sweep over `is_processed = false` pageviews. Session
//! assignment is best-effort and fully decoupled from aggregation: the
//! aggregator only ever counts distinct non-null `session_id` values, so it
//! tolerates the sweep running before, after, or between aggregation runs.

use anyhow::Result;
use chrono::Utc;

use bramble_core::session::session_key;

use crate::backend::{parse_ts, ts_param, DuckDbStore};

struct PendingPageView {
    id: String,
    site_id: String,
    ip_hash: String,
    user_agent: String,
    path: String,
    referrer: Option<String>,
    referrer_domain: Option<String>,
    created_at_raw: String,
}

impl DuckDbStore {
    /// Assign sessions to up to `limit` unprocessed pageviews, oldest first.
    ///
    /// Each pageview is handled in its own transaction: get-or-create the
    /// session row for its deterministic key, attach the pageview, then
    /// recompute the session's roll-up fields from all of its pageviews.
    /// Returns the number of pageviews processed. A failing pageview is
    /// logged and skipped; it stays unprocessed for the next sweep.
    pub async fn process_pending_sessions(&self, limit: usize) -> Result<usize> {
        let pending = self.fetch_pending(limit).await?;
        let mut processed = 0usize;

        for pv in &pending {
            match self.resolve_one(pv).await {
                Ok(()) => processed += 1,
                Err(err) => {
                    tracing::error!(
                        pageview = %pv.id,
                        site_id = %pv.site_id,
                        error = %err,
                        "session assignment failed"
                    );
                }
            }
        }

        if processed > 0 {
            tracing::info!(processed, "session sweep complete");
        }
        Ok(processed)
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<PendingPageView>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, site_id, ip_hash, user_agent, path, referrer, referrer_domain, \
                    CAST(created_at AS VARCHAR) \
             FROM page_views WHERE is_processed = false \
             ORDER BY created_at LIMIT ?1",
        )?;
        let rows = stmt.query_map(duckdb::params![limit as i64], |row| {
            Ok(PendingPageView {
                id: row.get(0)?,
                site_id: row.get(1)?,
                ip_hash: row.get(2)?,
                user_agent: row.get(3)?,
                path: row.get(4)?,
                referrer: row.get(5)?,
                referrer_domain: row.get(6)?,
                created_at_raw: row.get(7)?,
            })
        })?;
        let mut pending = Vec::new();
        for row in rows {
            pending.push(row?);
        }
        Ok(pending)
    }

    async fn resolve_one(&self, pv: &PendingPageView) -> Result<()> {
        let occurred_at = parse_ts(&pv.created_at_raw)?;
        let key = session_key(&pv.ip_hash, &pv.user_agent, occurred_at);

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = ts_param(Utc::now());

        // Get-or-create by deterministic key. ON CONFLICT DO NOTHING makes
        // the unique constraint the tie-breaker for racing resolvers; the
        // re-select below picks up the winner's row either way.
        let existing: Option<String> = {
            let mut stmt = tx.prepare("SELECT id FROM sessions WHERE session_key = ?1")?;
            stmt.query_row(duckdb::params![key], |row| row.get(0)).ok()
        };

        let session_id = match existing {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO sessions (id, site_id, session_key, is_bounce, duration, \
                     page_view_count, referrer, referrer_domain, enter_page, exit_page, \
                     created_at, updated_at) \
                     VALUES (?1, ?2, ?3, true, 0, 0, ?4, ?5, ?6, NULL, ?7, ?7) \
                     ON CONFLICT (session_key) DO NOTHING",
                    duckdb::params![
                        uuid::Uuid::new_v4().to_string(),
                        pv.site_id,
                        key,
                        pv.referrer,
                        pv.referrer_domain,
                        pv.path,
                        now
                    ],
                )?;
                let mut stmt = tx.prepare("SELECT id FROM sessions WHERE session_key = ?1")?;
                stmt.query_row(duckdb::params![key], |row| row.get(0))?
            }
        };

        tx.execute(
            "UPDATE page_views SET session_id = ?1, is_processed = true WHERE id = ?2",
            duckdb::params![session_id, pv.id],
        )?;

        // Recompute roll-up fields from every pageview in the session. The
        // session window is fixed at 30 minutes, so this set only grows
        // within one window and stays small.
        let (count, duration): (i64, i64) = {
            let mut stmt = tx.prepare(
                "SELECT COUNT(*), \
                        COALESCE(date_diff('second', MIN(created_at), MAX(created_at)), 0) \
                 FROM page_views WHERE session_id = ?1",
            )?;
            stmt.query_row(duckdb::params![session_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
        };
        let exit_page: Option<String> = if count > 1 {
            let mut stmt = tx.prepare(
                "SELECT path FROM page_views WHERE session_id = ?1 \
                 ORDER BY created_at DESC LIMIT 1",
            )?;
            stmt.query_row(duckdb::params![session_id], |row| row.get(0)).ok()
        } else {
            None
        };

        tx.execute(
            "UPDATE sessions SET page_view_count = ?1, is_bounce = ?2, duration = ?3, \
             exit_page = ?4, updated_at = ?5 WHERE id = ?6",
            duckdb::params![count, count == 1, duration, exit_page, now, session_id],
        )?;

        tx.commit()?;
        Ok(())
    }
}
