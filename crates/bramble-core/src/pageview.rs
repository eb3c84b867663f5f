//! The raw pageview record and URL helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw pageview event as produced by the ingestion collaborator.
///
/// Immutable once stored, except for `session_id` (attached asynchronously by
/// the session resolver) and `is_processed` (set once session assignment has
/// been attempted). `created_at` is the sole ordering and bucketing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    pub id: String,
    pub site_id: String,
    /// NULL until the session resolver has run for this pageview. Aggregation
    /// only ever needs "count of distinct non-null values" from this field.
    pub session_id: Option<String>,
    pub url: String,
    pub path: String,
    pub referrer: Option<String>,
    pub referrer_domain: Option<String>,
    /// Hashed upstream; the raw IP never reaches this system.
    pub ip_hash: String,
    pub user_agent: String,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub operating_system: Option<String>,
    pub device_type: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
}

/// Extract the path portion of a URL, defaulting to "/".
pub fn path_from_url(url: &str) -> String {
    let stripped = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    match stripped.find('/') {
        Some(idx) => {
            let path = &stripped[idx..];
            // Drop query string and fragment.
            let end = path.find(['?', '#']).unwrap_or(path.len());
            path[..end].to_string()
        }
        None => "/".to_string(),
    }
}

/// Extract the host from a full referrer URL.
///
/// Returns `None` if the referrer is empty or has no non-empty host.
pub fn extract_referrer_domain(referrer: &str) -> Option<String> {
    if referrer.is_empty() {
        return None;
    }
    let stripped = referrer
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let domain = stripped.split('/').next()?;
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}
