//! Persistence layer.
//!
//! - `offers`: append-only JSON-lines log of recorded offers
//! - `targets`: scan targets and airport names from a TOML file
//! - `alerts`: fixed price alerts as a JSON array
//!
//! Plain files are enough here: offers are only ever appended, and the
//! other two are small documents rewritten whole.

pub mod alerts;
pub mod offers;
pub mod targets;

pub use alerts::AlertStore;
pub use offers::{JsonlOfferStore, OfferSink};
pub use targets::{load_targets, parse_baseline, TargetsFile};
