//! Structured logging for the QC data pipeline.
//!
//! Every entry is one JSON object per line. Entries go to a per-run
//! directory (`events.jsonl` for info and above, `trace.jsonl` for
//! trace/debug) and are echoed to stderr so stdout stays free for report
//! output.
//!
//! Filtering:
//! - `LOG_LEVEL`: minimum level (default `info`)
//! - `LOG_DOMAINS`: comma-separated domain list or `all`
//! - `LOG_DIR`: base directory for run logs (default `out/runs`)
//! - `RUN_ID`: explicit run id (default `r-<epoch_ms>-<pid>`)

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Fetch,   // Single HTTP requests, snapshot fallback
    Load,    // Multi-page loads, progress
    Derive,  // Metric derivation
    Session, // Filter changes, load generations
    Auth,    // Credential checks
    System,  // Startup, configuration
    Profile, // Timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Fetch => "fetch",
            Domain::Load => "load",
            Domain::Derive => "derive",
            Domain::Session => "session",
            Domain::Auth => "auth",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(file) => Some(Mutex::new(BufWriter::new(file))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["password", "authorization", "Authorization", "token"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["collection", "generation", "page", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    eprintln!("{}", line);
}

// =============================================================================
// Fetch / load helpers
// =============================================================================

pub fn log_page_fetch(collection: &str, page: u32, records: usize, total_count: usize) {
    log(
        Level::Debug,
        Domain::Fetch,
        "page_fetched",
        obj(&[
            ("collection", v_str(collection)),
            ("page", json!(page)),
            ("records", json!(records)),
            ("total_count", json!(total_count)),
        ]),
    );
}

/// Warning emitted once per request that was answered from the bundled snapshot.
pub fn log_fallback(collection: &str, page: u32, reason: &str, snapshot_records: usize) {
    log(
        Level::Warn,
        Domain::Fetch,
        "fallback",
        obj(&[
            ("collection", v_str(collection)),
            ("page", json!(page)),
            ("reason", v_str(reason)),
            ("snapshot_records", json!(snapshot_records)),
            ("msg", v_str("backend unavailable, serving bundled snapshot")),
        ]),
    );
}

pub fn log_shape_error(collection: &str, page: u32, reason: &str) {
    log(
        Level::Warn,
        Domain::Fetch,
        "shape_error",
        obj(&[
            ("collection", v_str(collection)),
            ("page", json!(page)),
            ("reason", v_str(reason)),
            ("msg", v_str("unexpected response shape, treating page as empty")),
        ]),
    );
}

pub fn log_page_skipped(collection: &str, page: u32, total_pages: u32, reason: &str) {
    log(
        Level::Error,
        Domain::Load,
        "page_skipped",
        obj(&[
            ("collection", v_str(collection)),
            ("page", json!(page)),
            ("total_pages", json!(total_pages)),
            ("reason", v_str(reason)),
        ]),
    );
}

pub fn log_load_complete(
    collection: &str,
    origin: &str,
    records: usize,
    total_count: usize,
    failed_pages: usize,
) {
    log(
        Level::Info,
        Domain::Load,
        "load_complete",
        obj(&[
            ("collection", v_str(collection)),
            ("origin", v_str(origin)),
            ("records", json!(records)),
            ("total_count", json!(total_count)),
            ("failed_pages", json!(failed_pages)),
        ]),
    );
}

// =============================================================================
// Session / derivation helpers
// =============================================================================

pub fn log_stale_load(load_seq: u64, current_seq: u64, generation: u64, current_generation: u64) {
    log(
        Level::Info,
        Domain::Session,
        "stale_load_discarded",
        obj(&[
            ("load_seq", json!(load_seq)),
            ("current_load_seq", json!(current_seq)),
            ("generation", json!(generation)),
            ("current_generation", json!(current_generation)),
        ]),
    );
}

pub fn log_unmapped_models(models: &[String]) {
    if models.is_empty() {
        return;
    }
    log(
        Level::Warn,
        Domain::Derive,
        "unmapped_models",
        obj(&[
            ("count", json!(models.len())),
            (
                "models",
                Value::Array(models.iter().map(|m| v_str(m)).collect()),
            ),
            ("msg", v_str("models without an expected station are summed at every station")),
        ]),
    );
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(true)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
