//! Session-key derivation and the session record type.
//!
//! Sessions are derived without cookies from (hashed IP, user agent,
//! 30-minute time window). The window is fixed: a visit spanning the window
//! boundary produces two session keys by design.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Width of the session window in seconds. Windows start at minute 0 and
/// minute 30 of every hour.
pub const SESSION_WINDOW_SECS: i64 = 30 * 60;

/// Floor a timestamp to the start of its 30-minute session window.
pub fn session_window(occurred_at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = occurred_at.timestamp();
    let floored = secs - secs.rem_euclid(SESSION_WINDOW_SECS);
    DateTime::from_timestamp(floored, 0).unwrap_or(occurred_at)
}

/// Compute the deterministic session key for a pageview.
///
/// Formula: `sha256("{ip_hash}:{user_agent}:{window RFC3339}")`, hex-encoded
/// (64 chars). Identical (ip_hash, user_agent, window) always yields the
/// identical key, so concurrent resolvers converge on the same session row.
pub fn session_key(ip_hash: &str, user_agent: &str, occurred_at: DateTime<Utc>) -> String {
    let window = session_window(occurred_at);
    let input = format!("{}:{}:{}", ip_hash, user_agent, window.to_rfc3339());
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// A derived session row. Created on the first pageview in a window, then
/// mutated as later pageviews in the same window arrive.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub site_id: String,
    pub session_key: String,
    /// True iff the session has exactly one pageview.
    pub is_bounce: bool,
    /// Whole seconds between the first and last pageview.
    pub duration: i64,
    pub page_view_count: i64,
    /// Referrer of the first pageview in the session.
    pub referrer: Option<String>,
    pub referrer_domain: Option<String>,
    pub enter_page: String,
    /// Set once the session has more than one pageview.
    pub exit_page: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
