pub mod aggregate;
pub mod backend;
pub mod gaps;
pub mod schema;
pub mod session;

pub use backend::DuckDbStore;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `bramble_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
