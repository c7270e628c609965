//! Dashboard state: the active filter plus the dataset loaded for it.
//!
//! Every `begin_load` hands out a token with its own sequence number, and
//! only the most recently started load may apply its result. A date-range
//! change also starts a new generation, which clears loaded data. A load
//! that completes after a newer one started, or after the range moved on,
//! is discarded instead of overwriting newer data.

use serde::Serialize;
use serde_json::json;

use crate::derive::{DateRange, FamilyFilter, Filter};
use crate::error::LoadError;
use crate::loader::Dataset;
use crate::logging::{self, log, obj, Domain, Level};
use crate::report::{build_report, DashboardReport};
use crate::stations::StationMap;

/// Handed out by `begin_load`; identifies one load and the range it is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadToken {
    seq: u64,
    generation: u64,
    range: DateRange,
}

impl LoadToken {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading { progress: u8 },
    Ready,
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Discarded,
}

pub struct DashboardState {
    filter: Filter,
    generation: u64,
    load_seq: u64,
    status: LoadStatus,
    dataset: Option<Dataset>,
}

impl DashboardState {
    pub fn new(range: DateRange) -> Self {
        Self {
            filter: Filter::new(range),
            generation: 0,
            load_seq: 0,
            status: LoadStatus::Idle,
            dataset: None,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// Changes the range and invalidates loaded data and in-flight loads.
    pub fn set_range(&mut self, range: DateRange) {
        if range == self.filter.range {
            return;
        }
        self.filter.range = range;
        self.generation += 1;
        self.dataset = None;
        self.status = LoadStatus::Idle;
        log(
            Level::Debug,
            Domain::Session,
            "range_changed",
            obj(&[
                ("generation", json!(self.generation)),
                ("from", json!(range.from)),
                ("to", json!(range.to)),
            ]),
        );
    }

    /// Family and line only narrow what is derived; loaded data stays valid.
    pub fn set_family(&mut self, family: FamilyFilter) {
        self.filter.family = family;
    }

    pub fn set_line(&mut self, line: Option<String>) {
        self.filter.line = line.filter(|l| !l.trim().is_empty());
    }

    /// Starts a load and supersedes any load still in flight.
    pub fn begin_load(&mut self) -> LoadToken {
        self.load_seq += 1;
        self.status = LoadStatus::Loading { progress: 0 };
        LoadToken {
            seq: self.load_seq,
            generation: self.generation,
            range: self.filter.range,
        }
    }

    fn is_current(&self, token: &LoadToken) -> bool {
        token.seq == self.load_seq && token.generation == self.generation
    }

    /// Ignored for superseded loads.
    pub fn record_progress(&mut self, token: &LoadToken, progress: u8) {
        if !self.is_current(token) {
            return;
        }
        if let LoadStatus::Loading { progress: current } = &mut self.status {
            *current = (*current).max(progress.min(100));
        }
    }

    pub fn complete_load(&mut self, token: &LoadToken, result: Result<Dataset, LoadError>) -> ApplyOutcome {
        if !self.is_current(token) {
            logging::log_stale_load(token.seq, self.load_seq, token.generation, self.generation);
            return ApplyOutcome::Discarded;
        }
        match result {
            Ok(dataset) => {
                self.dataset = Some(dataset);
                self.status = LoadStatus::Ready;
            }
            Err(err) => {
                self.dataset = None;
                self.status = LoadStatus::Failed {
                    message: err.to_string(),
                };
            }
        }
        ApplyOutcome::Applied
    }

    /// Report for the current filter, if a dataset is loaded.
    pub fn report(&self, stations: &StationMap, top_n: usize) -> Option<DashboardReport> {
        self.dataset
            .as_ref()
            .map(|dataset| build_report(dataset, &self.filter, stations, top_n))
    }
}
