use std::env;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use serde_json::json;

use qc_dashboard::client::{DataClient, HttpTransport};
use qc_dashboard::config::Config;
use qc_dashboard::derive::{unit_history, DateRange, FamilyFilter, RangePreset};
use qc_dashboard::loader::{Dataset, PaginatedLoader};
use qc_dashboard::logging::{log, obj, v_str, Domain, Level};
use qc_dashboard::records::CollectionKind;
use qc_dashboard::session::{DashboardState, LoadStatus};

const USAGE: &str = "usage:
  qc-dashboard report [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--preset 7d|30d|this-month|last-month] [--family NAME] [--line NAME]
  qc-dashboard history <track_id> [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--preset P]
  qc-dashboard login <user>            (password read from QC_PASSWORD)";

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date: {}", raw))
}

fn resolve_range(cfg: &Config, args: &[String]) -> Result<DateRange> {
    let today = Local::now().date_naive();
    let mut range = match flag(args, "--preset") {
        Some(preset) => DateRange::preset(preset.parse::<RangePreset>()?, today),
        None => DateRange::last_days(today, cfg.default_range_days),
    };
    if let Some(from) = flag(args, "--from") {
        range.from = parse_day(from)?;
    }
    if let Some(to) = flag(args, "--to") {
        range.to = parse_day(to)?;
    }
    if range.from > range.to {
        bail!("start date {} is after end date {}", range.from, range.to);
    }
    Ok(range)
}

fn build_loader(cfg: &Config) -> Result<PaginatedLoader<HttpTransport>> {
    let transport = HttpTransport::new(&cfg.api_base, cfg.page_timeout())?;
    let client = DataClient::new(transport, cfg.snapshots()?).with_paths(cfg.paths.clone());
    Ok(PaginatedLoader::new(client).with_page_timeout(cfg.page_timeout()))
}

/// Overall progress across the three collections, loaded in `CollectionKind::ALL` order.
fn overall_progress(kind: CollectionKind, progress: u8) -> u8 {
    let done = CollectionKind::ALL.iter().position(|k| *k == kind).unwrap_or(0) as u32;
    let total = CollectionKind::ALL.len() as u32;
    ((done * 100 + u32::from(progress)) / total) as u8
}

async fn load_into(state: &mut DashboardState, loader: &PaginatedLoader<HttpTransport>) -> Result<()> {
    let token = state.begin_load();
    let range = *token.range();
    let result = loader
        .load_dataset(&range, |kind, p| {
            state.record_progress(&token, overall_progress(kind, p))
        })
        .await;
    state.complete_load(&token, result);
    match state.status() {
        LoadStatus::Failed { message } => Err(anyhow!("load failed: {}", message)),
        _ => Ok(()),
    }
}

async fn run_report(cfg: &Config, args: &[String]) -> Result<()> {
    let range = resolve_range(cfg, args)?;
    let stations = cfg.station_map()?;
    let loader = build_loader(cfg)?;

    let mut state = DashboardState::new(range);
    state.set_family(FamilyFilter::parse(flag(args, "--family").unwrap_or("")));
    state.set_line(flag(args, "--line").map(str::to_string));
    load_into(&mut state, &loader).await?;

    let report = state
        .report(&stations, cfg.top_n)
        .ok_or_else(|| anyhow!("no dataset loaded"))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_history(cfg: &Config, args: &[String]) -> Result<()> {
    let track_id = match args.first() {
        Some(id) if !id.starts_with("--") => id.clone(),
        _ => bail!("history needs a track id\n{}", USAGE),
    };
    let range = resolve_range(cfg, &args[1..])?;
    let loader = build_loader(cfg)?;

    let mut state = DashboardState::new(range);
    load_into(&mut state, &loader).await?;
    let dataset: &Dataset = state.dataset().ok_or_else(|| anyhow!("no dataset loaded"))?;

    let history = unit_history(&dataset.mqs.records, &dataset.mes.records, &track_id);
    let payload = json!({
        "range": range,
        "history": history,
        "sources": dataset.sources(),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_login(cfg: &Config, args: &[String]) -> Result<()> {
    let user = args.first().ok_or_else(|| anyhow!("login needs a user\n{}", USAGE))?;
    let password = env::var("QC_PASSWORD").context("QC_PASSWORD is not set")?;
    let store = cfg.credentials()?;
    match store.login(user, &password) {
        Some(session) => {
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(())
        }
        None => {
            eprintln!("login refused for {}", user);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cfg = Config::from_env();
    let command = args.first().map(String::as_str).unwrap_or("report");
    let rest = args.get(1..).unwrap_or(&[]);

    log(
        Level::Info,
        Domain::System,
        "start",
        obj(&[("command", v_str(command)), ("api_base", v_str(&cfg.api_base))]),
    );

    match command {
        "report" => run_report(&cfg, rest).await,
        "history" => run_history(&cfg, rest).await,
        "login" => run_login(&cfg, rest),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("unknown command: {}\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}
