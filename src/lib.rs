//! FARERADAR: flight-deal price monitor
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod logging;
pub mod types;
pub mod providers;
pub mod storage;
pub mod engine;
pub mod notify;
pub mod dashboard;
