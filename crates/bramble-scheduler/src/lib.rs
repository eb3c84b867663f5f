pub mod dispatcher;
pub mod scheduler;
pub mod telemetry;

pub use dispatcher::{
    run_worker_loop, AggregationRequest, Dispatcher, InlineDispatcher, QueuedDispatcher,
};
pub use scheduler::Scheduler;
pub use telemetry::Telemetry;
