use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use bramble_core::config::{Config, DispatchMode};
use bramble_duckdb::DuckDbStore;
use bramble_scheduler::{
    run_worker_loop, Dispatcher, InlineDispatcher, QueuedDispatcher, Scheduler, Telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Telemetry is constructed here, once, and handed to the scheduler.
    // There is no lazily-initialised global.
    let telemetry = Arc::new(Telemetry::init("bramble=info")?);

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure data directory exists before opening DuckDB.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/bramble.db", cfg.data_dir);
    let store = Arc::new(DuckDbStore::open(&db_path, &cfg.duckdb_memory_limit)?);

    // Transport variant is fixed at startup from config; nothing re-probes
    // queue availability per call.
    let dispatcher: Arc<dyn Dispatcher> = match cfg.dispatch_mode {
        DispatchMode::Inline => {
            info!("dispatch mode: inline");
            Arc::new(InlineDispatcher::new(Arc::clone(&store)))
        }
        DispatchMode::Queued => {
            info!(capacity = cfg.queue_capacity, "dispatch mode: queued");
            let (dispatcher, rx) = QueuedDispatcher::new(cfg.queue_capacity);
            let worker_store = Arc::clone(&store);
            tokio::spawn(async move {
                run_worker_loop(worker_store, rx).await;
            });
            Arc::new(dispatcher)
        }
    };

    let scheduler = Scheduler::new(Arc::clone(&store), dispatcher, cfg, telemetry);

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
