use std::collections::HashMap;

use serde::Serialize;

use crate::records::YieldRecord;
use crate::stations::StationMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationOutput {
    pub model: String,
    pub station: String,
    pub units: f64,
    /// False when the model has no entry in the station table.
    pub mapped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductionSummary {
    pub total: f64,
    pub by_model_station: Vec<StationOutput>,
    /// Models summed at every station because the table has no entry for them.
    pub unmapped_models: Vec<String>,
}

/// Units produced, counting each mapped model only at its entry station.
///
/// Records without a model name are skipped. A missing `Prime_Handle` adds 0.
pub fn production_total<'a>(
    records: impl IntoIterator<Item = &'a YieldRecord>,
    stations: &StationMap,
) -> ProductionSummary {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut summary = ProductionSummary::default();

    for r in records {
        let Some(model) = r.name.as_deref().map(str::trim).filter(|m| !m.is_empty()) else {
            continue;
        };
        let units = r.prime_handle.unwrap_or(0.0);

        let (station, mapped) = match stations.expected_station(model) {
            Some(expected) => {
                if r.process.as_deref() != Some(expected) {
                    continue;
                }
                (expected.to_string(), true)
            }
            None => {
                if !summary.unmapped_models.iter().any(|m| m == model) {
                    summary.unmapped_models.push(model.to_string());
                }
                let station = r
                    .process
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .unwrap_or("unknown");
                (station.to_string(), false)
            }
        };

        let key = (model.to_string(), station);
        match index.get(&key) {
            Some(&i) => summary.by_model_station[i].units += units,
            None => {
                index.insert(key.clone(), summary.by_model_station.len());
                summary.by_model_station.push(StationOutput {
                    model: key.0,
                    station: key.1,
                    units,
                    mapped,
                });
            }
        }
        summary.total += units;
    }

    summary
}
