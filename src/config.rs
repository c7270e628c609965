use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::auth::CredentialStore;
use crate::records::CollectionKind;
use crate::snapshot::SnapshotSet;
use crate::stations::StationMap;

/// Backend path per collection. Paths are absolute and joined onto the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPaths {
    pub yield_path: String,
    pub mes_path: String,
    pub mqs_path: String,
}

impl Default for CollectionPaths {
    fn default() -> Self {
        Self {
            yield_path: CollectionKind::Yield.default_path().to_string(),
            mes_path: CollectionKind::Mes.default_path().to_string(),
            mqs_path: CollectionKind::Mqs.default_path().to_string(),
        }
    }
}

impl CollectionPaths {
    pub fn path(&self, kind: CollectionKind) -> &str {
        match kind {
            CollectionKind::Yield => &self.yield_path,
            CollectionKind::Mes => &self.mes_path,
            CollectionKind::Mqs => &self.mqs_path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub paths: CollectionPaths,
    pub page_timeout_secs: u64,
    pub top_n: usize,
    pub default_range_days: i64,
    pub station_map_path: Option<String>,
    pub credentials_path: Option<String>,
    pub snapshot_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            paths: CollectionPaths::default(),
            page_timeout_secs: 10,
            top_n: 10,
            default_range_days: 30,
            station_map_path: None,
            credentials_path: None,
            snapshot_dir: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("QC_API_BASE").unwrap_or(defaults.api_base),
            paths: CollectionPaths {
                yield_path: std::env::var("QC_YIELD_PATH").unwrap_or(defaults.paths.yield_path),
                mes_path: std::env::var("QC_MES_PATH").unwrap_or(defaults.paths.mes_path),
                mqs_path: std::env::var("QC_MQS_PATH").unwrap_or(defaults.paths.mqs_path),
            },
            page_timeout_secs: std::env::var("QC_PAGE_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.page_timeout_secs),
            top_n: std::env::var("QC_TOP_N").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.top_n),
            default_range_days: std::env::var("QC_DEFAULT_RANGE_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.default_range_days),
            station_map_path: std::env::var("QC_STATION_MAP").ok(),
            credentials_path: std::env::var("QC_CREDENTIALS").ok(),
            snapshot_dir: std::env::var("QC_SNAPSHOT_DIR").ok(),
        }
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs.max(1))
    }

    /// Configured station table, or the built-in one.
    pub fn station_map(&self) -> Result<StationMap> {
        match &self.station_map_path {
            Some(path) => StationMap::from_json_file(Path::new(path)),
            None => Ok(StationMap::builtin()),
        }
    }

    /// Configured credential store. Without one, every login is refused.
    pub fn credentials(&self) -> Result<CredentialStore> {
        match &self.credentials_path {
            Some(path) => CredentialStore::from_json_file(Path::new(path)),
            None => Ok(CredentialStore::empty()),
        }
    }

    pub fn snapshots(&self) -> Result<SnapshotSet> {
        match &self.snapshot_dir {
            Some(dir) => SnapshotSet::from_dir(Path::new(dir)),
            None => Ok(SnapshotSet::bundled()),
        }
    }
}
