//! Domain types and pure logic for the Bramble aggregation engine.
//!
//! Nothing in this crate touches persistence. The DuckDB store in
//! `bramble-duckdb` and the scheduler glue in `bramble-scheduler` both build
//! on the types here.

pub mod bucket;
pub mod config;
pub mod error;
pub mod pageview;
pub mod session;
pub mod site;
