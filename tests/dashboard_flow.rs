use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use qc_dashboard::client::{DataClient, DataOrigin, Transport};
use qc_dashboard::config::CollectionPaths;
use qc_dashboard::derive::{repair_history, track_ids, DateRange, FamilyFilter};
use qc_dashboard::error::FetchError;
use qc_dashboard::loader::PaginatedLoader;
use qc_dashboard::records::{CollectionKind, MqsRecord};
use qc_dashboard::session::{ApplyOutcome, DashboardState, LoadStatus};
use qc_dashboard::snapshot::SnapshotSet;
use qc_dashboard::stations::StationMap;

/// Backend that is down for every collection.
struct DownTransport;

#[async_trait]
impl Transport for DownTransport {
    async fn get_json(&self, _path: &str, _params: &[(String, String)]) -> Result<Value, FetchError> {
        Err(FetchError::Transport("connection refused".to_string()))
    }
}

/// Paginates fixed rows per path, `page_size` rows per page.
struct RoutedTransport {
    rows: HashMap<String, Vec<Value>>,
    page_size: usize,
    requests: Mutex<Vec<(String, u32)>>,
}

impl RoutedTransport {
    fn new(page_size: usize) -> Self {
        Self {
            rows: HashMap::new(),
            page_size,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_rows(mut self, path: &str, rows: Vec<Value>) -> Self {
        self.rows.insert(path.to_string(), rows);
        self
    }

    fn requests_for(&self, path: &str) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, page)| *page)
            .collect()
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn get_json(&self, path: &str, params: &[(String, String)]) -> Result<Value, FetchError> {
        let page: u32 = params
            .iter()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(1);
        self.requests.lock().unwrap().push((path.to_string(), page));
        let rows = self.rows.get(path).ok_or(FetchError::Status(404))?;
        let start = (page as usize - 1) * self.page_size;
        let end = (start + self.page_size).min(rows.len());
        let results = rows.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();
        Ok(json!({"count": rows.len(), "results": results}))
    }
}

fn march_april() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
    )
}

fn mqs_rows(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "Testcode": format!("TC{}", i % 7),
                "Testcode_Desc": format!("failure {}", i % 7),
                "Family": if i % 2 == 0 { "Moto" } else { "Nokia" },
                "Line": format!("L{}", i % 3 + 1),
                "TrackId": format!("U{:04}", i % 40),
                "Prime": true,
                "NTF": i % 5 == 0,
                "date": "2025-04-10T10:00:00"
            })
        })
        .collect()
}

#[tokio::test]
async fn report_from_snapshots_when_backend_is_down() {
    let loader = PaginatedLoader::new(DataClient::new(DownTransport, SnapshotSet::bundled()));
    let mut state = DashboardState::new(march_april());
    let token = state.begin_load();
    let result = loader.load_dataset(&march_april(), |_, _| {}).await;
    assert_eq!(state.complete_load(&token, result), ApplyOutcome::Applied);
    assert_eq!(loader.client().fallback_count(), 3);

    let report = state.report(&StationMap::builtin(), 10).unwrap();
    assert!(report.sources.iter().all(|s| s.origin == DataOrigin::Snapshot));
    assert_eq!(report.kpis.records, 14);
    assert_eq!(report.production.total, 12582.0);
    assert!(report.production.unmapped_models.is_empty());

    let codes: Vec<(&str, usize)> = report
        .top_failures
        .iter()
        .map(|f| (f.code.as_str(), f.count))
        .collect();
    assert_eq!(
        codes,
        vec![
            ("RF TX power low", 4),
            ("Camera focus fail", 2),
            ("Display mura", 2),
            ("Battery ID read", 2),
            ("TC508", 1),
            ("Audio loopback", 1),
        ]
    );

    let months: Vec<(&str, &str)> = report
        .monthly_rejections
        .iter()
        .map(|m| (m.month.as_str(), m.code.as_str()))
        .collect();
    assert_eq!(months, vec![("2025-03", "AUD01"), ("2025-04", "RF01")]);

    // Paros has no DPHU and is left out of the mean.
    let dataset = state.dataset().unwrap();
    let with_dphu: Vec<f64> = dataset.yields.records.iter().filter_map(|r| r.dphu).collect();
    assert_eq!(with_dphu.len(), 13);
    let expected = with_dphu.iter().sum::<f64>() / 13.0;
    assert!((report.kpis.average_dphu.unwrap() - expected).abs() < 1e-9);
}

#[tokio::test]
async fn repair_join_over_snapshot_data() {
    let loader = PaginatedLoader::new(DataClient::new(DownTransport, SnapshotSet::bundled()));
    let dataset = loader.load_dataset(&march_april(), |_, _| {}).await.unwrap();

    let ids = track_ids(&dataset.mqs.records, "L1", &FamilyFilter::parse("Moto"));
    assert_eq!(ids, vec!["ZY22A1001", "ZY22A1002"]);

    let history = repair_history(&dataset.mes.records, "ZY22A1001");
    let repairers: Vec<&str> = history.iter().filter_map(|r| r.repairer.as_deref()).collect();
    assert_eq!(repairers, vec!["tech-07", "tech-11"]);
    assert!(repair_history(&dataset.mes.records, "ZY22A1002").is_empty());
}

#[tokio::test]
async fn paginated_backend_is_fully_aggregated() {
    let paths = CollectionPaths {
        mqs_path: "/mqs/".to_string(),
        ..CollectionPaths::default()
    };
    let transport = RoutedTransport::new(50)
        .with_rows("/mqs/", mqs_rows(120))
        .with_rows("/api/yield/", Vec::new())
        .with_rows("/api/mes/", Vec::new());
    let client = DataClient::new(transport, SnapshotSet::bundled()).with_paths(paths);
    let loader = PaginatedLoader::new(client);

    let outcome = loader
        .load_all::<MqsRecord, _>(&march_april(), |_| {})
        .await
        .unwrap();
    assert_eq!(outcome.records.len(), 120);
    assert_eq!(outcome.origin, DataOrigin::Backend);
    assert_eq!(loader.client().transport().requests_for("/mqs/"), vec![1, 2, 3]);

    let dataset = loader.load_dataset(&march_april(), |_, _| {}).await.unwrap();
    assert!(dataset.yields.records.is_empty());
    assert_eq!(dataset.yields.origin, DataOrigin::Backend);
    assert_eq!(loader.client().fallback_count(), 0);
}

#[tokio::test]
async fn missing_collection_falls_back_alone() {
    let transport = RoutedTransport::new(50).with_rows("/api/mqs/", mqs_rows(10));
    let loader = PaginatedLoader::new(DataClient::new(transport, SnapshotSet::bundled()));
    let dataset = loader.load_dataset(&march_april(), |_, _| {}).await.unwrap();

    let origins: Vec<(CollectionKind, DataOrigin)> = dataset
        .sources()
        .iter()
        .map(|s| (s.collection, s.origin))
        .collect();
    assert_eq!(
        origins,
        vec![
            (CollectionKind::Yield, DataOrigin::Snapshot),
            (CollectionKind::Mqs, DataOrigin::Backend),
            (CollectionKind::Mes, DataOrigin::Snapshot),
        ]
    );
    assert_eq!(loader.client().fallback_count(), 2);
}

#[tokio::test]
async fn slow_load_for_an_old_range_does_not_overwrite() {
    let transport = RoutedTransport::new(50)
        .with_rows("/api/yield/", Vec::new())
        .with_rows("/api/mqs/", mqs_rows(10))
        .with_rows("/api/mes/", Vec::new());
    let loader = PaginatedLoader::new(DataClient::new(transport, SnapshotSet::bundled()));

    let old_range = march_april();
    let new_range = DateRange::new(
        NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
        NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
    );
    let mut state = DashboardState::new(old_range);
    let old_token = state.begin_load();
    let old_result = loader.load_dataset(&old_range, |_, _| {}).await;

    state.set_range(new_range);
    let new_token = state.begin_load();
    let new_result = loader.load_dataset(&new_range, |_, _| {}).await;

    assert_eq!(state.complete_load(&new_token, new_result), ApplyOutcome::Applied);
    assert_eq!(state.complete_load(&old_token, old_result), ApplyOutcome::Discarded);
    assert_eq!(state.dataset().unwrap().range, new_range);
    assert_eq!(state.status(), &LoadStatus::Ready);

    let report = state.report(&StationMap::builtin(), 3).unwrap();
    assert_eq!(report.top_failures.len(), 3);
    assert_eq!(report.filter.range, new_range);
}
