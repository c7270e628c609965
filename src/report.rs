//! Everything the dashboard pages show for one filter, as a single
//! serializable value.

use serde::Serialize;
use serde_json::json;

use crate::derive::{
    apply_filter, distinct_families, distinct_lines, filter_by_date_range, filter_by_family,
    fty_by_line_and_day, production_total, top_failure_per_family, top_failure_per_line,
    top_failures, top_rejection_per_month, yield_kpis, FailureCount, FamilyTopFailure, Filter,
    LineSeries, LineTopFailure, MonthlyRejection, ProductionSummary, YieldKpis,
};
use crate::loader::{Dataset, SourceInfo};
use crate::logging::{self, log, obj, ts_now, Domain, Level, ProfileScope};
use crate::stations::StationMap;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub generated_at: String,
    pub filter: Filter,
    pub sources: Vec<SourceInfo>,
    /// Selectable families and lines, from the unfiltered data.
    pub families: Vec<String>,
    pub lines: Vec<String>,
    pub kpis: YieldKpis,
    pub production: ProductionSummary,
    pub top_failures: Vec<FailureCount>,
    pub family_top_failures: Vec<FamilyTopFailure>,
    pub line_top_failures: Vec<LineTopFailure>,
    pub monthly_rejections: Vec<MonthlyRejection>,
    pub fty_by_line: Vec<LineSeries>,
}

fn merge_sorted(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    a.extend(b);
    a.sort();
    a.dedup();
    a
}

pub fn build_report(dataset: &Dataset, filter: &Filter, stations: &StationMap, top_n: usize) -> DashboardReport {
    let _profile = ProfileScope::new("build_report");

    let yields = apply_filter(&dataset.yields.records, filter);
    let mqs = apply_filter(&dataset.mqs.records, filter);
    // MES rows have no line column, so the line filter does not apply to them.
    let mes = filter_by_family(
        filter_by_date_range(&dataset.mes.records, &filter.range),
        &filter.family,
    );

    let production = production_total(yields.iter().copied(), stations);
    logging::log_unmapped_models(&production.unmapped_models);

    log(
        Level::Debug,
        Domain::Derive,
        "report_inputs",
        obj(&[
            ("yield", json!(yields.len())),
            ("mqs", json!(mqs.len())),
            ("mes", json!(mes.len())),
        ]),
    );

    DashboardReport {
        generated_at: ts_now(),
        filter: filter.clone(),
        sources: dataset.sources(),
        families: merge_sorted(
            distinct_families(&dataset.yields.records),
            distinct_families(&dataset.mqs.records),
        ),
        lines: merge_sorted(
            distinct_lines(&dataset.yields.records),
            distinct_lines(&dataset.mqs.records),
        ),
        kpis: yield_kpis(&yields, &production),
        production,
        top_failures: top_failures(mqs.iter().copied(), top_n),
        family_top_failures: top_failure_per_family(mqs.iter().copied()),
        line_top_failures: top_failure_per_line(mqs.iter().copied()),
        monthly_rejections: top_rejection_per_month(mes.iter().copied()),
        fty_by_line: fty_by_line_and_day(yields.iter().copied()),
    }
}
