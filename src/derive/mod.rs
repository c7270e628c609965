//! Pure derivations over loaded record sets: filters, rankings, KPIs,
//! production totals and the repair join. Nothing here does I/O.

pub mod filter;
pub mod kpi;
pub mod production;
pub mod ranking;
pub mod repair;

pub use filter::{
    apply_filter, distinct_families, distinct_lines, filter_by_date_range, filter_by_family,
    filter_by_line, DateRange, FamilyFilter, Filter, RangePreset,
};
pub use kpi::{average_dphu, average_fty, fty_by_line_and_day, mean, yield_kpis, DailyFty, LineSeries, YieldKpis};
pub use production::{production_total, ProductionSummary, StationOutput};
pub use ranking::{
    count_by_key, failure_key, top_failure_per_family, top_failure_per_line, top_failures,
    top_rejection_per_month, FailureCount, FamilyTopFailure, LineTopFailure, MonthlyRejection, UNKNOWN,
};
pub use repair::{repair_history, track_ids, unit_history, UnitHistory};
