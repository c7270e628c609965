//! Yield KPIs.
//!
//! Aggregation policy: sums treat a missing value as 0, means leave it out
//! of both numerator and denominator. A record with no FTY therefore does
//! not drag the average down, while a record with no `Prime_Handle` still
//! contributes nothing to production.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::derive::production::ProductionSummary;
use crate::derive::ranking::UNKNOWN;
use crate::records::{Record, YieldRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldKpis {
    pub records: usize,
    pub total_production: f64,
    pub average_dphu: Option<f64>,
    pub average_fty: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyFty {
    pub day: NaiveDate,
    pub fty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub line: String,
    pub points: Vec<DailyFty>,
}

/// Mean of the present values, `None` if there are none.
pub fn mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

pub fn average_dphu<'a>(records: impl IntoIterator<Item = &'a YieldRecord>) -> Option<f64> {
    mean(records.into_iter().map(|r| r.dphu))
}

pub fn average_fty<'a>(records: impl IntoIterator<Item = &'a YieldRecord>) -> Option<f64> {
    mean(records.into_iter().map(|r| r.fty))
}

/// KPIs for the filtered yield records; `production` must come from the same records.
pub fn yield_kpis(records: &[&YieldRecord], production: &ProductionSummary) -> YieldKpis {
    YieldKpis {
        records: records.len(),
        total_production: production.total,
        average_dphu: average_dphu(records.iter().copied()),
        average_fty: average_fty(records.iter().copied()),
    }
}

/// Mean FTY per line and day. Lines keep first-seen order, days ascend.
pub fn fty_by_line_and_day<'a>(records: impl IntoIterator<Item = &'a YieldRecord>) -> Vec<LineSeries> {
    let mut lines: Vec<(String, BTreeMap<NaiveDate, Vec<Option<f64>>>)> = Vec::new();
    for r in records {
        let Some(ts) = r.timestamp() else { continue };
        let line = r.line().filter(|l| !l.trim().is_empty()).unwrap_or(UNKNOWN);
        let i = match lines.iter().position(|(l, _)| l.as_str() == line) {
            Some(i) => i,
            None => {
                lines.push((line.to_string(), BTreeMap::new()));
                lines.len() - 1
            }
        };
        lines[i].1.entry(ts.date()).or_default().push(r.fty);
    }

    lines
        .into_iter()
        .map(|(line, days)| LineSeries {
            line,
            points: days
                .into_iter()
                .filter_map(|(day, values)| mean(values).map(|fty| DailyFty { day, fty }))
                .collect(),
        })
        .filter(|series| !series.points.is_empty())
        .collect()
}
