//! Core engine: date grid, per-destination scanning, fixed-alert sniper
//! and the guarded run orchestration that ties them together.

pub mod grid;
pub mod runner;
pub mod scanner;
pub mod sniper;

pub use grid::DateGrid;
pub use runner::{
    FlightRunner, RunControl, RunReport, RunRequest, RunSummary, RunTicket, RunnerSettings, SniperTicket,
};
pub use scanner::{DestinationScan, ManualScan, PriceScanner, ScanConfig, ScanOutcome, ScanState};
pub use sniper::{Sniper, SniperReport};
