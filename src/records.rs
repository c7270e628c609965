//! Raw record types for the three backend collections.
//!
//! Field names on the wire are the backend's and are kept through serde
//! renames. Decoding never fails on a bad field value: numbers that are not
//! numbers, dates that are not dates, and so on decode to `None` and are
//! excluded later by whichever aggregate looks at them.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Yield,
    Mes,
    Mqs,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 3] = [CollectionKind::Yield, CollectionKind::Mqs, CollectionKind::Mes];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Yield => "yield",
            CollectionKind::Mes => "mes",
            CollectionKind::Mqs => "mqs",
        }
    }

    pub fn default_path(&self) -> &'static str {
        match self {
            CollectionKind::Yield => "/api/yield/",
            CollectionKind::Mes => "/api/mes/",
            CollectionKind::Mqs => "/api/mqs/",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common view over the three record types.
pub trait Record: DeserializeOwned + Serialize + Clone + Send + Sync + 'static {
    const KIND: CollectionKind;

    /// Raw timestamp used by date-range filtering.
    fn date_str(&self) -> Option<&str>;

    fn family(&self) -> Option<&str> {
        None
    }

    fn line(&self) -> Option<&str> {
        None
    }

    fn timestamp(&self) -> Option<NaiveDateTime> {
        self.date_str().and_then(parse_timestamp)
    }

    /// Exact, case-sensitive family match.
    fn matches_family(&self, family: &str) -> bool {
        self.family() == Some(family)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YieldRecord {
    #[serde(deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(rename = "Family", deserialize_with = "lenient_text")]
    pub family: Option<String>,
    #[serde(rename = "Line", deserialize_with = "lenient_text")]
    pub line: Option<String>,
    /// Model name.
    #[serde(rename = "Name", deserialize_with = "lenient_text")]
    pub name: Option<String>,
    /// Station.
    #[serde(rename = "Process", deserialize_with = "lenient_text")]
    pub process: Option<String>,
    #[serde(rename = "Prime_Handle", deserialize_with = "lenient_number")]
    pub prime_handle: Option<f64>,
    #[serde(rename = "Prime_Fail", deserialize_with = "lenient_number")]
    pub prime_fail: Option<f64>,
    #[serde(rename = "DPHU", deserialize_with = "lenient_number")]
    pub dphu: Option<f64>,
    #[serde(rename = "FTY", deserialize_with = "lenient_number")]
    pub fty: Option<f64>,
}

impl Record for YieldRecord {
    const KIND: CollectionKind = CollectionKind::Yield;

    fn date_str(&self) -> Option<&str> {
        self.date.as_deref()
    }

    fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqsRecord {
    #[serde(rename = "Testcode", deserialize_with = "lenient_text")]
    pub testcode: Option<String>,
    #[serde(rename = "Testcode_Desc", deserialize_with = "lenient_text")]
    pub testcode_desc: Option<String>,
    #[serde(rename = "Family", deserialize_with = "lenient_text")]
    pub family: Option<String>,
    #[serde(rename = "Line", deserialize_with = "lenient_text")]
    pub line: Option<String>,
    #[serde(rename = "TrackId", deserialize_with = "lenient_text")]
    pub track_id: Option<String>,
    #[serde(rename = "Prime", deserialize_with = "lenient_flag")]
    pub prime: bool,
    #[serde(rename = "NTF", deserialize_with = "lenient_flag")]
    pub ntf: bool,
    #[serde(deserialize_with = "lenient_text")]
    pub date: Option<String>,
}

impl Record for MqsRecord {
    const KIND: CollectionKind = CollectionKind::Mqs;

    fn date_str(&self) -> Option<&str> {
        self.date.as_deref()
    }

    fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MesRecord {
    /// Serial / track id of the repaired unit.
    #[serde(rename = "NS", deserialize_with = "lenient_text")]
    pub ns: Option<String>,
    #[serde(rename = "FECHA_RECHAZO", deserialize_with = "lenient_text")]
    pub rejected_at: Option<String>,
    #[serde(rename = "FECHA_REPARACION", deserialize_with = "lenient_text")]
    pub repaired_at: Option<String>,
    #[serde(rename = "CODIGO_FALLA", deserialize_with = "lenient_text")]
    pub failure_code: Option<String>,
    #[serde(rename = "POSICION", deserialize_with = "lenient_text")]
    pub position: Option<String>,
    #[serde(rename = "CAUSA", deserialize_with = "lenient_text")]
    pub cause: Option<String>,
    #[serde(rename = "ACCION", deserialize_with = "lenient_text")]
    pub action: Option<String>,
    #[serde(rename = "REPARADOR", deserialize_with = "lenient_text")]
    pub repairer: Option<String>,
    #[serde(rename = "MODELO", deserialize_with = "lenient_text")]
    pub model: Option<String>,
}

impl Record for MesRecord {
    const KIND: CollectionKind = CollectionKind::Mes;

    fn date_str(&self) -> Option<&str> {
        self.rejected_at.as_deref()
    }

    // MES rows carry no family column; the model name embeds it.
    fn matches_family(&self, family: &str) -> bool {
        self.model.as_deref().is_some_and(|m| m.contains(family))
    }
}

// =============================================================================
// Lenient field decoding
// =============================================================================

/// Finite number from a JSON number or numeric string.
pub fn number_from_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(raw.as_ref().and_then(number_from_value))
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(match raw {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(match raw {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    })
}

// =============================================================================
// Timestamps
// =============================================================================

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a backend timestamp. Offsets are dropped, keeping the wall clock of
/// the plant that produced the record.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
