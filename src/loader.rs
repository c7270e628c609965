//! Paginated fetch aggregator.
//!
//! Walks `page=1..=N` for one collection strictly in order. Page 1 decides
//! everything: if it fails the whole collection comes from the snapshot,
//! otherwise its length is the page size and `count` gives the page total.
//! Later pages that fail or time out are logged and skipped; there is no
//! retry.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::time::timeout;

use crate::client::{DataClient, DataOrigin, Page, PageQuery, Transport};
use crate::derive::DateRange;
use crate::error::{FetchError, LoadError};
use crate::logging::{self, log, obj, v_str, Domain, Level, ProfileScope};
use crate::records::{CollectionKind, MesRecord, MqsRecord, Record, YieldRecord};

pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything retrieved for one collection.
#[derive(Debug, Clone)]
pub struct LoadOutcome<R> {
    pub records: Vec<R>,
    pub origin: DataOrigin,
    pub total_count: usize,
    pub total_pages: u32,
    /// Pages that failed or timed out and were skipped.
    pub failed_pages: Vec<u32>,
}

impl<R: Record> LoadOutcome<R> {
    fn from_single_page(page: Page<R>) -> Self {
        Self {
            total_count: page.total_count,
            origin: page.origin,
            records: page.records,
            total_pages: 1,
            failed_pages: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }

    pub fn source_info(&self) -> SourceInfo {
        SourceInfo {
            collection: R::KIND,
            origin: self.origin,
            records: self.records.len(),
            total_count: self.total_count,
            failed_pages: self.failed_pages.clone(),
            fingerprint: fingerprint(&self.records),
        }
    }
}

/// Where a collection's data came from and how much of it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub collection: CollectionKind,
    pub origin: DataOrigin,
    pub records: usize,
    pub total_count: usize,
    pub failed_pages: Vec<u32>,
    pub fingerprint: String,
}

/// SHA-256 over the JSON encoding of the records.
pub fn fingerprint<R: Serialize>(records: &[R]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(serde_json::to_vec(record).unwrap_or_default());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// The three collections loaded for one date range.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub range: DateRange,
    pub yields: LoadOutcome<YieldRecord>,
    pub mqs: LoadOutcome<MqsRecord>,
    pub mes: LoadOutcome<MesRecord>,
}

impl Dataset {
    pub fn sources(&self) -> Vec<SourceInfo> {
        vec![
            self.yields.source_info(),
            self.mqs.source_info(),
            self.mes.source_info(),
        ]
    }
}

fn percent(done: u32, total: u32) -> u8 {
    if total == 0 || done >= total {
        return 100;
    }
    (u64::from(done) * 100 / u64::from(total)) as u8
}

pub struct PaginatedLoader<T> {
    client: DataClient<T>,
    page_timeout: Duration,
}

impl<T: Transport> PaginatedLoader<T> {
    pub fn new(client: DataClient<T>) -> Self {
        Self {
            client,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    pub fn with_page_timeout(mut self, page_timeout: Duration) -> Self {
        self.page_timeout = page_timeout;
        self
    }

    pub fn client(&self) -> &DataClient<T> {
        &self.client
    }

    /// Every record of `R` in `range`. `on_progress` receives a
    /// non-decreasing percentage after each page and always ends at 100.
    pub async fn load_all<R, F>(&self, range: &DateRange, mut on_progress: F) -> Result<LoadOutcome<R>, LoadError>
    where
        R: Record,
        F: FnMut(u8),
    {
        let kind = R::KIND;
        let _profile = ProfileScope::with_context("load_all", &[("collection", v_str(kind.as_str()))]);
        let first_query = PageQuery::first(range);

        let first = match timeout(self.page_timeout, self.client.fetch_collection::<R>(&first_query)).await {
            Ok(result) => result?,
            Err(_) => {
                let reason = FetchError::Timeout(self.page_timeout).to_string();
                self.client.fallback_page::<R>(1, &reason)?
            }
        };

        if first.origin == DataOrigin::Snapshot {
            on_progress(100);
            return Ok(self.finish(LoadOutcome::from_single_page(first)));
        }

        let page_size = first.page_len();
        let total_count = first.total_count;
        if total_count <= page_size {
            on_progress(100);
            return Ok(self.finish(LoadOutcome::from_single_page(first)));
        }
        if page_size == 0 {
            log(
                Level::Warn,
                Domain::Load,
                "page_size_unknown",
                obj(&[
                    ("collection", v_str(kind.as_str())),
                    ("total_count", json!(total_count)),
                    ("msg", v_str("first page is empty, cannot derive page count")),
                ]),
            );
            on_progress(100);
            return Ok(self.finish(LoadOutcome::from_single_page(first)));
        }

        let total_pages = u32::try_from(total_count.div_ceil(page_size)).unwrap_or(u32::MAX);
        let mut records = first.records;
        records.reserve(total_count.saturating_sub(records.len()));
        let mut failed_pages = Vec::new();
        on_progress(percent(1, total_pages));

        for page in 2..=total_pages {
            let query = first_query.with_page(page);
            let result = match timeout(self.page_timeout, self.client.try_fetch_page::<R>(&query)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(self.page_timeout)),
            };
            match result {
                Ok(p) => records.extend(p.records),
                Err(err) => {
                    logging::log_page_skipped(kind.as_str(), page, total_pages, &err.to_string());
                    failed_pages.push(page);
                }
            }
            on_progress(percent(page, total_pages));
        }

        Ok(self.finish(LoadOutcome {
            records,
            origin: DataOrigin::Backend,
            total_count,
            total_pages,
            failed_pages,
        }))
    }

    fn finish<R: Record>(&self, outcome: LoadOutcome<R>) -> LoadOutcome<R> {
        logging::log_load_complete(
            R::KIND.as_str(),
            outcome.origin.as_str(),
            outcome.records.len(),
            outcome.total_count,
            outcome.failed_pages.len(),
        );
        outcome
    }

    /// Yield, MQS and MES for `range`, one collection after another.
    pub async fn load_dataset<F>(&self, range: &DateRange, mut on_progress: F) -> Result<Dataset, LoadError>
    where
        F: FnMut(CollectionKind, u8),
    {
        let yields = self
            .load_all::<YieldRecord, _>(range, |p| on_progress(CollectionKind::Yield, p))
            .await?;
        let mqs = self
            .load_all::<MqsRecord, _>(range, |p| on_progress(CollectionKind::Mqs, p))
            .await?;
        let mes = self
            .load_all::<MesRecord, _>(range, |p| on_progress(CollectionKind::Mes, p))
            .await?;
        Ok(Dataset {
            range: *range,
            yields,
            mqs,
            mes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotSet;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Serves `total` MQS rows in pages of `page_size`, with scripted failures.
    struct PagedTransport {
        total: usize,
        page_size: usize,
        failing: Vec<u32>,
        hanging: Vec<u32>,
        requested: Mutex<Vec<u32>>,
    }

    impl PagedTransport {
        fn new(total: usize, page_size: usize) -> Self {
            Self {
                total,
                page_size,
                failing: Vec::new(),
                hanging: Vec::new(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for PagedTransport {
        async fn get_json(&self, _path: &str, params: &[(String, String)]) -> Result<Value, FetchError> {
            let page: u32 = params
                .iter()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap();
            self.requested.lock().unwrap().push(page);
            if self.hanging.contains(&page) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failing.contains(&page) {
                return Err(FetchError::Status(502));
            }
            let start = (page as usize - 1) * self.page_size;
            let end = (start + self.page_size).min(self.total);
            let results: Vec<Value> = (start..end)
                .map(|i| json!({"Testcode": format!("T{}", i), "TrackId": format!("U{}", i)}))
                .collect();
            Ok(json!({"count": self.total, "results": results}))
        }
    }

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        )
    }

    fn loader(transport: PagedTransport) -> PaginatedLoader<PagedTransport> {
        PaginatedLoader::new(DataClient::new(transport, SnapshotSet::bundled()))
    }

    #[tokio::test]
    async fn test_single_page_makes_one_request() {
        let loader = loader(PagedTransport::new(3, 50));
        let mut progress = Vec::new();
        let outcome = loader
            .load_all::<MqsRecord, _>(&range(), |p| progress.push(p))
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.total_pages, 1);
        assert_eq!(loader.client().transport().requested(), vec![1]);
        assert_eq!(progress, vec![100]);
    }

    #[tokio::test]
    async fn test_walks_remaining_pages_in_order() {
        let loader = loader(PagedTransport::new(120, 50));
        let mut progress = Vec::new();
        let outcome = loader
            .load_all::<MqsRecord, _>(&range(), |p| progress.push(p))
            .await
            .unwrap();
        assert_eq!(loader.client().transport().requested(), vec![1, 2, 3]);
        assert_eq!(outcome.records.len(), 120);
        assert_eq!(outcome.total_pages, 3);
        assert_eq!(outcome.origin, DataOrigin::Backend);
        assert!(outcome.is_complete());
        assert_eq!(outcome.records[119].testcode.as_deref(), Some("T119"));
        assert_eq!(progress, vec![33, 66, 100]);
    }

    #[tokio::test]
    async fn test_failed_page_is_skipped() {
        let mut transport = PagedTransport::new(120, 50);
        transport.failing = vec![2];
        let loader = loader(transport);
        let mut progress = Vec::new();
        let outcome = loader
            .load_all::<MqsRecord, _>(&range(), |p| progress.push(p))
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 70);
        assert_eq!(outcome.failed_pages, vec![2]);
        assert_eq!(outcome.origin, DataOrigin::Backend);
        assert_eq!(loader.client().fallback_count(), 0);
        assert_eq!(progress.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_first_page_failure_serves_snapshot() {
        let mut transport = PagedTransport::new(120, 50);
        transport.failing = vec![1];
        let loader = loader(transport);
        let mut progress = Vec::new();
        let outcome = loader
            .load_all::<MqsRecord, _>(&range(), |p| progress.push(p))
            .await
            .unwrap();
        let snapshot = SnapshotSet::bundled().page::<MqsRecord>().unwrap();
        assert_eq!(outcome.origin, DataOrigin::Snapshot);
        assert_eq!(outcome.records, snapshot.records);
        assert_eq!(loader.client().transport().requested(), vec![1]);
        assert_eq!(loader.client().fallback_count(), 1);
        assert_eq!(progress, vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_page_timeout_serves_snapshot() {
        let mut transport = PagedTransport::new(120, 50);
        transport.hanging = vec![1];
        let loader = loader(transport).with_page_timeout(Duration::from_secs(5));
        let outcome = loader.load_all::<MqsRecord, _>(&range(), |_| {}).await.unwrap();
        assert_eq!(outcome.origin, DataOrigin::Snapshot);
        assert_eq!(loader.client().fallback_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_page_timeout_is_skipped() {
        let mut transport = PagedTransport::new(120, 50);
        transport.hanging = vec![3];
        let loader = loader(transport).with_page_timeout(Duration::from_secs(5));
        let outcome = loader.load_all::<MqsRecord, _>(&range(), |_| {}).await.unwrap();
        assert_eq!(outcome.records.len(), 100);
        assert_eq!(outcome.failed_pages, vec![3]);
        assert_eq!(loader.client().fallback_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_first_page_with_count_stops() {
        let loader = loader(PagedTransport::new(10, 0));
        let outcome = loader.load_all::<MqsRecord, _>(&range(), |_| {}).await.unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.total_count, 10);
        assert_eq!(loader.client().transport().requested(), vec![1]);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_100() {
        let mut transport = PagedTransport::new(1000, 30);
        transport.failing = vec![4, 17];
        let loader = loader(transport);
        let mut progress = Vec::new();
        let outcome = loader
            .load_all::<MqsRecord, _>(&range(), |p| progress.push(p))
            .await
            .unwrap();
        assert_eq!(outcome.total_pages, 34);
        assert_eq!(progress.len(), 34);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_unusable_snapshot_surfaces_error() {
        let mut transport = PagedTransport::new(10, 5);
        transport.failing = vec![1];
        let snapshots = SnapshotSet::bundled().with_raw(CollectionKind::Mqs, "{}");
        let loader = PaginatedLoader::new(DataClient::new(transport, snapshots));
        let err = loader.load_all::<MqsRecord, _>(&range(), |_| {}).await.unwrap_err();
        assert!(matches!(err, LoadError::Unavailable { kind: CollectionKind::Mqs, .. }));
        assert_eq!(loader.client().fallback_count(), 0);
    }

    #[tokio::test]
    async fn test_load_dataset_reports_each_collection() {
        let loader = loader(PagedTransport::new(4, 4));
        let mut seen = Vec::new();
        let dataset = loader
            .load_dataset(&range(), |kind, p| seen.push((kind, p)))
            .await
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (CollectionKind::Yield, 100),
                (CollectionKind::Mqs, 100),
                (CollectionKind::Mes, 100)
            ]
        );
        let sources = dataset.sources();
        assert_eq!(sources.len(), 3);
        assert!(sources.iter().all(|s| s.origin == DataOrigin::Backend && s.records == 4));
        assert_eq!(sources[1].fingerprint, fingerprint(&dataset.mqs.records));
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = vec![MqsRecord::default()];
        let b = vec![MqsRecord {
            ntf: true,
            ..Default::default()
        }];
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint::<MqsRecord>(&[]).len(), 64);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }
}
