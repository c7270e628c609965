//! Failure rankings over MQS and MES records.
//!
//! All groupings keep first-seen key order and sort with a stable sort, so
//! ties go to the key that appeared first in the input.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde::Serialize;

use crate::records::{MesRecord, MqsRecord, Record};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCount {
    pub code: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyTopFailure {
    pub family: String,
    pub testcode: String,
    pub prime_count: usize,
    pub ntf_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineTopFailure {
    pub line: String,
    pub code: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyRejection {
    /// `YYYY-MM`
    pub month: String,
    pub code: String,
    pub count: usize,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Description, then code, then `"Unknown"`.
pub fn failure_key(record: &MqsRecord) -> &str {
    non_empty(record.testcode_desc.as_deref())
        .or_else(|| non_empty(record.testcode.as_deref()))
        .unwrap_or(UNKNOWN)
}

/// Occurrence counts in first-seen key order.
pub fn count_by_key<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<(K, usize)>
where
    K: Eq + Hash + Clone,
    F: FnMut(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, usize)> = Vec::new();
    for item in items {
        let k = key(&item);
        match index.get(&k) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(k.clone(), counts.len());
                counts.push((k, 1));
            }
        }
    }
    counts
}

/// Highest count; the earliest entry wins ties.
fn top_entry<K>(counts: Vec<(K, usize)>) -> Option<(K, usize)> {
    let mut best: Option<(K, usize)> = None;
    for (k, c) in counts {
        if best.as_ref().map_or(true, |(_, best_count)| c > *best_count) {
            best = Some((k, c));
        }
    }
    best
}

pub fn top_failures<'a>(records: impl IntoIterator<Item = &'a MqsRecord>, n: usize) -> Vec<FailureCount> {
    let mut counts = count_by_key(records, |r| failure_key(r).to_string());
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
        .into_iter()
        .map(|(code, count)| FailureCount { code, count })
        .collect()
}

/// One row per family: the `(Testcode, Family)` group with the most Prime failures.
pub fn top_failure_per_family<'a>(
    records: impl IntoIterator<Item = &'a MqsRecord>,
) -> Vec<FamilyTopFailure> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<FamilyTopFailure> = Vec::new();
    for r in records {
        let testcode = non_empty(r.testcode.as_deref()).unwrap_or(UNKNOWN).to_string();
        let family = non_empty(r.family()).unwrap_or(UNKNOWN).to_string();
        let i = *index
            .entry((testcode.clone(), family.clone()))
            .or_insert_with(|| {
                groups.push(FamilyTopFailure {
                    family,
                    testcode,
                    prime_count: 0,
                    ntf_count: 0,
                });
                groups.len() - 1
            });
        if r.prime {
            groups[i].prime_count += 1;
        }
        if r.ntf {
            groups[i].ntf_count += 1;
        }
    }

    let mut best: Vec<FamilyTopFailure> = Vec::new();
    for group in groups {
        match best.iter().position(|b| b.family == group.family) {
            Some(i) => {
                if group.prime_count > best[i].prime_count {
                    best[i] = group;
                }
            }
            None => best.push(group),
        }
    }
    best.sort_by(|a, b| b.prime_count.cmp(&a.prime_count));
    best
}

/// Most frequent failure description per line, lines sorted by that count.
pub fn top_failure_per_line<'a>(
    records: impl IntoIterator<Item = &'a MqsRecord>,
) -> Vec<LineTopFailure> {
    let mut per_line: Vec<(String, Vec<&'a MqsRecord>)> = Vec::new();
    for r in records {
        let line = non_empty(r.line()).unwrap_or(UNKNOWN);
        match per_line.iter().position(|(l, _)| l.as_str() == line) {
            Some(i) => per_line[i].1.push(r),
            None => per_line.push((line.to_string(), vec![r])),
        }
    }

    let mut rows: Vec<LineTopFailure> = per_line
        .into_iter()
        .filter_map(|(line, rows)| {
            let counts = count_by_key(rows, |r| {
                non_empty(r.testcode_desc.as_deref()).unwrap_or(UNKNOWN).to_string()
            });
            top_entry(counts).map(|(code, count)| LineTopFailure { line, code, count })
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

/// Most frequent MES failure code per rejection month, months ascending.
pub fn top_rejection_per_month<'a>(
    records: impl IntoIterator<Item = &'a MesRecord>,
) -> Vec<MonthlyRejection> {
    let mut months: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for r in records {
        let Some(ts) = r.timestamp() else { continue };
        let code = non_empty(r.failure_code.as_deref()).unwrap_or(UNKNOWN).to_string();
        months
            .entry(ts.format("%Y-%m").to_string())
            .or_default()
            .push(code);
    }

    months
        .into_iter()
        .filter_map(|(month, codes)| {
            top_entry(count_by_key(codes, |c| c.clone()))
                .map(|(code, count)| MonthlyRejection { month, code, count })
        })
        .collect()
}
