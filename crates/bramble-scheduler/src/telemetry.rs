//! Caller-owned telemetry handle.
//!
//! Logging is process-wide state with an explicit lifecycle: `main`
//! constructs a `Telemetry` once at startup and hands it to whatever needs
//! to emit; the scheduler cannot be built without one. There is no hidden
//! "already configured" flag; constructing a second handle is a hard error
//! from the subscriber itself.

use anyhow::Result;

/// Proof that structured logging has been initialised.
pub struct Telemetry {
    _private: (),
}

impl Telemetry {
    /// Install the global JSON subscriber. Level is controlled via the
    /// `RUST_LOG` env var, with `default_directive` as the fallback for this
    /// crate family (e.g. `"bramble=info"`).
    pub fn init(default_directive: &str) -> Result<Self> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(default_directive.parse()?),
            )
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("telemetry already initialised: {e}"))?;
        Ok(Self { _private: () })
    }

    /// A handle that installs nothing. For tests, where the harness (or an
    /// earlier test) owns the subscriber.
    pub fn noop() -> Self {
        Self { _private: () }
    }
}
