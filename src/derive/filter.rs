use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::records::Record;

/// Inclusive day range. `to` covers its whole day, up to 23:59:59.999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePreset {
    Last7Days,
    Last30Days,
    ThisMonth,
    LastMonth,
}

impl FromStr for RangePreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "7d" | "last-7-days" => Ok(RangePreset::Last7Days),
            "30d" | "last-30-days" => Ok(RangePreset::Last30Days),
            "this-month" => Ok(RangePreset::ThisMonth),
            "last-month" => Ok(RangePreset::LastMonth),
            other => Err(anyhow!("unknown range preset: {}", other)),
        }
    }
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.day0() as i64)
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// `YYYY-MM-DD` bounds.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        let from = NaiveDate::parse_from_str(from, "%Y-%m-%d")
            .with_context(|| format!("invalid start date: {}", from))?;
        let to = NaiveDate::parse_from_str(to, "%Y-%m-%d")
            .with_context(|| format!("invalid end date: {}", to))?;
        Ok(Self { from, to })
    }

    pub fn last_days(today: NaiveDate, days: i64) -> Self {
        Self {
            from: today - Duration::days(days),
            to: today,
        }
    }

    pub fn preset(preset: RangePreset, today: NaiveDate) -> Self {
        match preset {
            RangePreset::Last7Days => Self::last_days(today, 7),
            RangePreset::Last30Days => Self::last_days(today, 30),
            RangePreset::ThisMonth => Self {
                from: first_of_month(today),
                to: today,
            },
            RangePreset::LastMonth => {
                let to = first_of_month(today) - Duration::days(1);
                Self {
                    from: first_of_month(to),
                    to,
                }
            }
        }
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }
}

/// Family selection. The "all families" entries of the UI map to `All`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum FamilyFilter {
    #[default]
    All,
    Exact(String),
}

impl FamilyFilter {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" | "Todas" | "Todas las familias" => FamilyFilter::All,
            name => FamilyFilter::Exact(name.to_string()),
        }
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        match self {
            FamilyFilter::All => true,
            FamilyFilter::Exact(name) => record.matches_family(name),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            FamilyFilter::All => None,
            FamilyFilter::Exact(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filter {
    pub range: DateRange,
    pub family: FamilyFilter,
    pub line: Option<String>,
}

impl Filter {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            family: FamilyFilter::All,
            line: None,
        }
    }
}

pub fn filter_by_date_range<'a, R: Record>(
    records: impl IntoIterator<Item = &'a R>,
    range: &DateRange,
) -> Vec<&'a R> {
    records
        .into_iter()
        .filter(|r| r.timestamp().is_some_and(|ts| range.contains_day(ts.date())))
        .collect()
}

pub fn filter_by_family<'a, R: Record>(
    records: impl IntoIterator<Item = &'a R>,
    family: &FamilyFilter,
) -> Vec<&'a R> {
    records.into_iter().filter(|r| family.matches(*r)).collect()
}

pub fn filter_by_line<'a, R: Record>(
    records: impl IntoIterator<Item = &'a R>,
    line: Option<&str>,
) -> Vec<&'a R> {
    records
        .into_iter()
        .filter(|r| line.map_or(true, |l| r.line() == Some(l)))
        .collect()
}

/// Date range, then family, then line.
pub fn apply_filter<'a, R: Record>(records: &'a [R], filter: &Filter) -> Vec<&'a R> {
    let in_range = filter_by_date_range(records, &filter.range);
    let in_family = filter_by_family(in_range, &filter.family);
    filter_by_line(in_family, filter.line.as_deref())
}

/// Sorted, non-empty family names.
pub fn distinct_families<R: Record>(records: &[R]) -> Vec<String> {
    distinct(records.iter().filter_map(|r| r.family()))
}

/// Sorted, non-empty line names.
pub fn distinct_lines<R: Record>(records: &[R]) -> Vec<String> {
    distinct(records.iter().filter_map(|r| r.line()))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
