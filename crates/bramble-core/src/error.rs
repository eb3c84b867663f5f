use chrono::{DateTime, Utc};
use thiserror::Error;

/// Caller-visible input errors, surfaced before any bucket work starts.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("window start {start} is after window end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("unknown site: {0}")]
    UnknownSite(String),
}
