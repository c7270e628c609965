//! Remote data client for the yield / MES / MQS collections.
//!
//! `fetch_collection` never surfaces a transport failure: the bundled
//! snapshot for the collection is served instead and a `fetch.fallback`
//! warning is logged once per failed call. `try_fetch_page` is the raw
//! variant used for follow-up pages, where a failure means "skip this page"
//! rather than "replace everything with the snapshot".

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::config::CollectionPaths;
use crate::derive::DateRange;
use crate::error::{FetchError, LoadError, ShapeError};
use crate::logging::{self, log, obj, v_str, Domain, Level};
use crate::records::{number_from_value, Record};
use crate::snapshot::SnapshotSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Backend,
    Snapshot,
}

impl DataOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataOrigin::Backend => "backend",
            DataOrigin::Snapshot => "snapshot",
        }
    }
}

/// One normalized response page.
#[derive(Debug, Clone)]
pub struct Page<R> {
    /// Total records the backend reports for the whole query.
    pub total_count: usize,
    pub records: Vec<R>,
    pub origin: DataOrigin,
    /// Entries the backend sent that were not records (not JSON objects).
    pub dropped: usize,
}

impl<R> Page<R> {
    pub fn empty(origin: DataOrigin) -> Self {
        Self {
            total_count: 0,
            records: Vec::new(),
            origin,
            dropped: 0,
        }
    }

    /// Number of entries the backend put on this page.
    pub fn page_len(&self) -> usize {
        self.records.len() + self.dropped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub page: u32,
}

impl PageQuery {
    pub fn first(range: &DateRange) -> Self {
        Self {
            date_from: range.from,
            date_to: range.to,
            page: 1,
        }
    }

    pub fn with_page(self, page: u32) -> Self {
        Self { page, ..self }
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("date_from".to_string(), self.date_from.format("%Y-%m-%d").to_string()),
            ("date_to".to_string(), self.date_to.format("%Y-%m-%d").to_string()),
            ("page".to_string(), self.page.to_string()),
        ]
    }
}

// =============================================================================
// Transport
// =============================================================================

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `path` with query `params`, returning the decoded JSON body.
    async fn get_json(&self, path: &str, params: &[(String, String)]) -> Result<Value, FetchError>;
}

/// reqwest-backed transport against a fixed base URL.
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid API base URL: {}", base))?;
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("building HTTP client")?,
            base,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, path: &str, params: &[(String, String)]) -> Result<Value, FetchError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| FetchError::Transport(format!("bad path {}: {}", path, e)))?;

        let resp = self.client.get(url).query(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

// =============================================================================
// Response normalization
// =============================================================================

pub(crate) struct DecodedPage<R> {
    pub total_count: usize,
    pub records: Vec<R>,
    pub dropped: usize,
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object without `results`",
    }
}

/// Accepts `{ "count": n, "results": [...] }` or a bare legacy array.
pub(crate) fn decode_page<R: Record>(value: Value) -> Result<DecodedPage<R>, ShapeError> {
    let (count, items) = match value {
        Value::Array(items) => (None, items),
        Value::Object(mut map) => {
            let count = map
                .get("count")
                .and_then(number_from_value)
                .filter(|c| *c >= 0.0)
                .map(|c| c as usize);
            match map.remove("results") {
                Some(Value::Array(items)) => (count, items),
                Some(_) => return Err(ShapeError::ResultsNotArray),
                None => return Err(ShapeError::UnexpectedShape(shape_name(&Value::Object(map)))),
            }
        }
        other => return Err(ShapeError::UnexpectedShape(shape_name(&other))),
    };

    let sent = items.len();
    let records: Vec<R> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    let dropped = sent - records.len();

    Ok(DecodedPage {
        total_count: count.unwrap_or(sent),
        records,
        dropped,
    })
}

// =============================================================================
// Client
// =============================================================================

pub struct DataClient<T> {
    transport: T,
    snapshots: SnapshotSet,
    paths: CollectionPaths,
    fallbacks: AtomicU64,
}

impl<T: Transport> DataClient<T> {
    pub fn new(transport: T, snapshots: SnapshotSet) -> Self {
        Self {
            transport,
            snapshots,
            paths: CollectionPaths::default(),
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn with_paths(mut self, paths: CollectionPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of failed requests answered from the snapshot so far. Moves in
    /// step with the `fallback` warning.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::SeqCst)
    }

    /// One backend page, no fallback. A response of the wrong shape is
    /// logged and becomes an empty page.
    pub async fn try_fetch_page<R: Record>(&self, query: &PageQuery) -> Result<Page<R>, FetchError> {
        let kind = R::KIND;
        let value = self
            .transport
            .get_json(self.paths.path(kind), &query.to_params())
            .await?;

        let page = match decode_page::<R>(value) {
            Ok(decoded) => {
                if decoded.dropped > 0 {
                    log(
                        Level::Debug,
                        Domain::Fetch,
                        "entries_dropped",
                        obj(&[
                            ("collection", v_str(kind.as_str())),
                            ("page", json!(query.page)),
                            ("dropped", json!(decoded.dropped)),
                        ]),
                    );
                }
                Page {
                    total_count: decoded.total_count,
                    records: decoded.records,
                    origin: DataOrigin::Backend,
                    dropped: decoded.dropped,
                }
            }
            Err(shape) => {
                logging::log_shape_error(kind.as_str(), query.page, &shape.to_string());
                Page::empty(DataOrigin::Backend)
            }
        };

        logging::log_page_fetch(kind.as_str(), query.page, page.records.len(), page.total_count);
        Ok(page)
    }

    /// One backend page, or the whole snapshot if the request fails.
    pub async fn fetch_collection<R: Record>(&self, query: &PageQuery) -> Result<Page<R>, LoadError> {
        match self.try_fetch_page::<R>(query).await {
            Ok(page) => Ok(page),
            Err(err) => self.fallback_page::<R>(query.page, &err.to_string()),
        }
    }

    /// Serve the snapshot for `R` in place of a failed request.
    pub fn fallback_page<R: Record>(&self, page: u32, reason: &str) -> Result<Page<R>, LoadError> {
        let kind = R::KIND;
        match self.snapshots.page::<R>() {
            Ok(snapshot) => {
                self.fallbacks.fetch_add(1, Ordering::SeqCst);
                logging::log_fallback(kind.as_str(), page, reason, snapshot.records.len());
                Ok(snapshot)
            }
            Err(snapshot_err) => {
                log(
                    Level::Error,
                    Domain::Fetch,
                    "fallback_failed",
                    obj(&[
                        ("collection", v_str(kind.as_str())),
                        ("page", json!(page)),
                        ("backend_error", v_str(reason)),
                        ("snapshot_error", v_str(&snapshot_err.to_string())),
                    ]),
                );
                Err(LoadError::Unavailable {
                    kind,
                    backend: reason.to_string(),
                    snapshot: snapshot_err.to_string(),
                })
            }
        }
    }
}
