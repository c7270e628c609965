//! Local snapshots served when the backend cannot be reached.

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::client::{decode_page, DataOrigin, Page};
use crate::error::LoadError;
use crate::records::{CollectionKind, Record};

const BUNDLED_YIELD: &str = include_str!("../data/snapshots/yield.json");
const BUNDLED_MES: &str = include_str!("../data/snapshots/mes.json");
const BUNDLED_MQS: &str = include_str!("../data/snapshots/mqs.json");

/// One snapshot document per collection, shaped like a backend page.
#[derive(Debug, Clone)]
pub struct SnapshotSet {
    yield_json: Cow<'static, str>,
    mes_json: Cow<'static, str>,
    mqs_json: Cow<'static, str>,
}

impl Default for SnapshotSet {
    fn default() -> Self {
        Self::bundled()
    }
}

impl SnapshotSet {
    /// Snapshots compiled into the binary.
    pub fn bundled() -> Self {
        Self {
            yield_json: Cow::Borrowed(BUNDLED_YIELD),
            mes_json: Cow::Borrowed(BUNDLED_MES),
            mqs_json: Cow::Borrowed(BUNDLED_MQS),
        }
    }

    /// Bundled snapshots, replaced by `<dir>/<kind>.json` where present.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut set = Self::bundled();
        for kind in CollectionKind::ALL {
            let path = dir.join(format!("{}.json", kind.as_str()));
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading snapshot {}", path.display()))?;
            set = set.with_raw(kind, text);
        }
        Ok(set)
    }

    pub fn with_raw(mut self, kind: CollectionKind, json: impl Into<Cow<'static, str>>) -> Self {
        let json = json.into();
        match kind {
            CollectionKind::Yield => self.yield_json = json,
            CollectionKind::Mes => self.mes_json = json,
            CollectionKind::Mqs => self.mqs_json = json,
        }
        self
    }

    pub fn raw(&self, kind: CollectionKind) -> &str {
        match kind {
            CollectionKind::Yield => &self.yield_json,
            CollectionKind::Mes => &self.mes_json,
            CollectionKind::Mqs => &self.mqs_json,
        }
    }

    /// The whole snapshot for `R` as a single page.
    pub fn page<R: Record>(&self) -> Result<Page<R>, LoadError> {
        let snapshot_err = |reason: String| LoadError::Snapshot {
            kind: R::KIND,
            reason,
        };
        let value: Value =
            serde_json::from_str(self.raw(R::KIND)).map_err(|e| snapshot_err(e.to_string()))?;
        let decoded = decode_page::<R>(value).map_err(|e| snapshot_err(e.to_string()))?;
        Ok(Page {
            total_count: decoded.records.len(),
            records: decoded.records,
            origin: DataOrigin::Snapshot,
            dropped: decoded.dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{MesRecord, MqsRecord, YieldRecord};

    #[test]
    fn test_bundled_snapshots_decode() {
        let set = SnapshotSet::bundled();
        let yields = set.page::<YieldRecord>().unwrap();
        let mqs = set.page::<MqsRecord>().unwrap();
        let mes = set.page::<MesRecord>().unwrap();
        assert!(!yields.records.is_empty());
        assert!(!mqs.records.is_empty());
        assert!(!mes.records.is_empty());
        assert_eq!(yields.origin, DataOrigin::Snapshot);
        assert_eq!(yields.total_count, yields.records.len());
    }

    #[test]
    fn test_malformed_snapshot_is_an_error() {
        let set = SnapshotSet::bundled().with_raw(CollectionKind::Mqs, "{ not json");
        let err = set.page::<MqsRecord>().unwrap_err();
        assert!(matches!(err, LoadError::Snapshot { kind: CollectionKind::Mqs, .. }));
    }

    #[test]
    fn test_from_dir_overrides_present_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("mes.json"),
            r#"[{"NS": "X1", "CODIGO_FALLA": "F1"}]"#,
        )
        .unwrap();
        let set = SnapshotSet::from_dir(dir.path()).unwrap();
        let mes = set.page::<MesRecord>().unwrap();
        assert_eq!(mes.records.len(), 1);
        assert_eq!(mes.records[0].ns.as_deref(), Some("X1"));
        assert_eq!(set.raw(CollectionKind::Yield), BUNDLED_YIELD);
    }
}
