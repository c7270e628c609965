//! Model → entry-station routing table.
//!
//! A model's production is counted at one station only, so re-test passes
//! at other stations are not double counted.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationMap {
    entries: BTreeMap<String, String>,
}

impl StationMap {
    pub fn builtin() -> Self {
        [
            ("Aruba4000", "RADIOSLIM"),
            ("Aura", "UCT"),
            ("Bangkok 5G", "FODTEST"),
            ("Bora", "L2AR"),
            ("Lamu", "L2VISION"),
            ("Lamu Lite GO", "L2VISION"),
            ("Lamu Lite", "L2VISION"),
            ("Manila", "L2VISION"),
            ("Milos", "UCT"),
            ("MilosPlus", "L2AR"),
            ("Orion", "L2AR"),
            ("Paros", "L2AR"),
            ("Malmo", "UCT"),
            ("Wrangler", "XCVR_LT"),
            ("Cusco", "IFLASH"),
            ("Velar", "RADIOSLIM"),
        ]
        .into_iter()
        .collect()
    }

    /// JSON object of `"model": "station"` pairs.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading station map {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing station map {}", path.display()))
    }

    pub fn expected_station(&self, model: &str) -> Option<&str> {
        self.entries.get(model).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<M: Into<String>, S: Into<String>> FromIterator<(M, S)> for StationMap {
    fn from_iter<I: IntoIterator<Item = (M, S)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(m, s)| (m.into(), s.into())).collect(),
        }
    }
}
