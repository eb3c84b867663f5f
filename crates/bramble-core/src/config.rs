use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    /// DuckDB size string such as "1GB" or "512MB".
    pub duckdb_memory_limit: String,
    /// Scheduler tick: current-hour aggregation and the session sweep run on
    /// every tick.
    pub tick_seconds: u64,
    /// How often the backfill scan runs.
    pub backfill_interval_seconds: u64,
    /// Hourly gap-scan window, in days back from now.
    pub backfill_hour_days: i64,
    /// Daily gap-scan window, in days back from now.
    pub backfill_day_days: i64,
    pub dispatch_mode: DispatchMode,
    /// Bound of the queued dispatcher's channel.
    pub queue_capacity: usize,
    /// Max pageviews handled per session sweep.
    pub session_sweep_batch: usize,
}

/// Transport selection for aggregation requests. Chosen once at startup, not
/// re-probed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Inline,
    Queued,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            data_dir: std::env::var("BRAMBLE_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("BRAMBLE_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            tick_seconds: std::env::var("BRAMBLE_TICK_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .map_err(|e| format!("invalid BRAMBLE_TICK_SECONDS: {e}"))?
                .clamp(10, 3600),
            backfill_interval_seconds: std::env::var("BRAMBLE_BACKFILL_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
            backfill_hour_days: std::env::var("BRAMBLE_BACKFILL_HOUR_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .unwrap_or(7),
            backfill_day_days: std::env::var("BRAMBLE_BACKFILL_DAY_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            dispatch_mode: {
                let raw =
                    std::env::var("BRAMBLE_DISPATCH").unwrap_or_else(|_| "inline".to_string());
                match raw.as_str() {
                    "queued" => DispatchMode::Queued,
                    _ => DispatchMode::Inline,
                }
            },
            queue_capacity: std::env::var("BRAMBLE_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .unwrap_or(1024),
            session_sweep_batch: std::env::var("BRAMBLE_SESSION_SWEEP_BATCH")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    pub fn backfill_interval(&self) -> Duration {
        Duration::from_secs(self.backfill_interval_seconds)
    }
}
