//! End-to-end tests against the public crate API with in-memory
//! providers and sinks.

mod mock_provider;
mod run_flow;
mod scan_scenarios;
