use serde::Serialize;

use crate::derive::filter::FamilyFilter;
use crate::records::{MesRecord, MqsRecord, Record};

/// Everything known about one unit: its MQS failures and MES repairs.
#[derive(Debug, Clone, Serialize)]
pub struct UnitHistory<'a> {
    pub track_id: String,
    pub failures: Vec<&'a MqsRecord>,
    pub repairs: Vec<&'a MesRecord>,
}

/// MES records whose `NS` is exactly `track_id`, in input order.
pub fn repair_history<'a>(
    records: impl IntoIterator<Item = &'a MesRecord>,
    track_id: &str,
) -> Vec<&'a MesRecord> {
    if track_id.is_empty() {
        return Vec::new();
    }
    records
        .into_iter()
        .filter(|r| r.ns.as_deref() == Some(track_id))
        .collect()
}

/// Unique TrackIds of MQS failures for a line, optionally narrowed to a
/// family, in first-seen order.
pub fn track_ids<'a>(
    records: impl IntoIterator<Item = &'a MqsRecord>,
    line: &str,
    family: &FamilyFilter,
) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for r in records {
        if r.line() != Some(line) || !family.matches(r) {
            continue;
        }
        let Some(id) = r.track_id.as_deref().filter(|id| !id.trim().is_empty()) else {
            continue;
        };
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Both sides joined on exact equality with `track_id`.
pub fn unit_history<'a>(mqs: &'a [MqsRecord], mes: &'a [MesRecord], track_id: &str) -> UnitHistory<'a> {
    UnitHistory {
        track_id: track_id.to_string(),
        failures: mqs
            .iter()
            .filter(|r| !track_id.is_empty() && r.track_id.as_deref() == Some(track_id))
            .collect(),
        repairs: repair_history(mes, track_id),
    }
}
