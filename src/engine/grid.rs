//! Candidate date grid.
//!
//! Departures run from the furthest date in the window back toward the
//! nearest, one every `step_days`. Each departure is paired with a return
//! at each configured offset, in order.

use chrono::{Duration, NaiveDate};

use crate::config::GridSettings;
use crate::types::DatePair;

/// One departure date and its candidate return dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub depart: NaiveDate,
    pub returns: Vec<NaiveDate>,
}

impl Departure {
    pub fn pairs(&self) -> impl Iterator<Item = DatePair> + '_ {
        self.returns
            .iter()
            .map(move |r| DatePair::round_trip(self.depart, *r))
    }
}

/// Reverse-chronological grid of date pairs, most-future first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGrid {
    departures: Vec<Departure>,
}

impl DateGrid {
    /// Build the grid relative to `today`.
    pub fn reverse_from(today: NaiveDate, settings: &GridSettings) -> Self {
        let nearest = today + Duration::days(settings.nearest_days);
        let step = Duration::days(settings.step_days.max(1));

        let mut departures = Vec::new();
        let mut depart = today + Duration::days(settings.furthest_days);
        while depart >= nearest {
            let returns = settings
                .return_offsets
                .iter()
                .map(|offset| depart + Duration::days(*offset))
                .collect();
            departures.push(Departure { depart, returns });
            depart -= step;
        }

        Self { departures }
    }

    pub fn departures(&self) -> &[Departure] {
        &self.departures
    }

    /// Total number of date pairs; an upper bound on lookups per destination.
    pub fn len(&self) -> usize {
        self.departures.iter().map(|d| d.returns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All pairs in scan order.
    pub fn pairs(&self) -> impl Iterator<Item = DatePair> + '_ {
        self.departures.iter().flat_map(|d| d.pairs())
    }
}
