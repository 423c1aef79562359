//! Export: CSV tables and versioned JSON reports.
//!
//! JSON exports wrap their payload in a `Report` envelope carrying the schema
//! version and the snapshot fingerprint, so a report can be traced back to the
//! exact data it was computed from. Newer schema versions are rejected on load.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::diversification::{ConcentrationSummary, DiversificationRow, PopularityRow, RiskRow};
use crate::leaderboard::Leaderboard;

/// Version of the JSON report layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Versioned JSON envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report<T> {
    pub schema_version: u32,
    /// What the payload is, e.g. `leaderboard` or `risk`.
    pub kind: String,
    /// BLAKE3 fingerprint of the snapshot the payload was derived from.
    pub fingerprint: String,
    pub data: T,
}

impl<T> Report<T> {
    pub fn new(kind: impl Into<String>, fingerprint: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            kind: kind.into(),
            fingerprint: fingerprint.into(),
            data,
        }
    }
}

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json<T: Serialize>(kind: &str, fingerprint: &str, data: &T) -> Result<String> {
    serde_json::to_string_pretty(&Report::new(kind, fingerprint, data))
        .with_context(|| format!("failed to serialize {kind} report to JSON"))
}

/// Load a report, rejecting schema versions newer than this build knows.
pub fn import_json<T: DeserializeOwned>(json: &str) -> Result<Report<T>> {
    let report: Report<T> =
        serde_json::from_str(json).context("failed to deserialize report from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV ────────────────────────────────────────────────────────────

fn opt(v: Option<f64>, precision: usize) -> String {
    v.map(|x| format!("{x:.precision$}")).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: rank, uid, display_name, <metric label>, weeks_counted,
/// base_balance, end_balance, latest_week
pub fn leaderboard_csv(board: &Leaderboard) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "rank",
        "uid",
        "display_name",
        board.mode.metric_label(),
        "weeks_counted",
        "base_balance",
        "end_balance",
        "latest_week",
    ])?;
    for r in &board.rows {
        wtr.write_record([
            &r.rank.to_string(),
            &r.uid,
            &r.display_name,
            &format!("{:.4}", r.metric),
            &r.weeks_counted.to_string(),
            &opt(r.base_balance, 2),
            &opt(r.end_balance, 2),
            &r.latest_week.map(|w| w.to_string()).unwrap_or_default(),
        ])?;
    }
    finish(wtr)
}

pub fn diversification_csv(rows: &[DiversificationRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["uid", "allocations", "avg_instrument_count"])?;
    for r in rows {
        wtr.write_record([
            r.uid.clone(),
            r.allocations.to_string(),
            opt(r.avg_instrument_count, 4),
        ])?;
    }
    finish(wtr)
}

pub fn popularity_csv(rows: &[PopularityRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["code", "name", "category", "count", "total_weight", "avg_weight"])?;
    for r in rows {
        wtr.write_record([
            r.code.clone(),
            r.name.clone().unwrap_or_default(),
            r.category.clone().unwrap_or_default(),
            r.count.to_string(),
            format!("{:.4}", r.total_weight),
            format!("{:.4}", r.avg_weight),
        ])?;
    }
    finish(wtr)
}

pub fn risk_csv(rows: &[RiskRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["uid", "max_single_weight", "risk_tier"])?;
    for r in rows {
        wtr.write_record([
            r.uid.clone(),
            format!("{:.4}", r.max_single_weight),
            r.risk_tier.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn concentration_csv(summary: &ConcentrationSummary) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["unique_instruments", "total_usage", "top3_share", "concentration_index"])?;
    wtr.write_record([
        summary.unique_instruments.to_string(),
        summary.total_usage.to_string(),
        format!("{:.4}", summary.top3_share),
        format!("{:.4}", summary.concentration_index),
    ])?;
    finish(wtr)
}

// ─── Tests ───────────────────────────────────────────────────────────
