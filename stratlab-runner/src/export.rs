//! Export — JSON reports and CSV ledgers.
//!
//! - **JSON**: full `RunReport` round trip with schema versioning
//! - **CSV**: trade ledger and equity curve for spreadsheets and plotting
//!
//! Reports carry a `schemaVersion`; newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use stratlab_core::domain::{format_timestamp, EquityPoint, Trade, TradeKind};

use crate::runner::{RunReport, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `RunReport` to pretty JSON.
pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

/// Deserialize a `RunReport` from JSON, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade ledger as CSV, one row per entry or exit.
///
/// Columns: kind, time, timestamp, price, profit, profit_pct, reason
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "kind",
        "time",
        "timestamp",
        "price",
        "profit",
        "profit_pct",
        "reason",
    ])?;

    for t in trades {
        let kind = match t.kind {
            TradeKind::Entry => "entry",
            TradeKind::Exit => "exit",
        };
        wtr.write_record([
            kind,
            &t.time.to_string(),
            &format_timestamp(t.time),
            &format!("{:.6}", t.price),
            &t.profit.map(|p| format!("{p:.2}")).unwrap_or_default(),
            &t.profit_pct.map(|p| format!("{p:.4}")).unwrap_or_default(),
            t.reason.as_deref().unwrap_or(""),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Equity curve as CSV with time, timestamp, and equity columns.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "timestamp", "equity"])?;
    for point in equity_curve {
        wtr.write_record([
            &point.time.to_string(),
            &format_timestamp(point.time),
            &format!("{:.2}", point.value),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Files ──────────────────────────────────────────────────────────

/// `<ClassName>_<SYMBOL>`, with anything outside `[A-Za-z0-9_-]` dropped.
pub fn report_stem(report: &RunReport) -> String {
    let symbol: String = report
        .symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    format!("{}_{symbol}", report.strategy.class_name)
}

/// Write `<stem>.json` (and `<stem>_trades.csv`, `<stem>_equity.csv` when
/// `with_csv`) under `output_dir`. Returns the paths written.
pub fn save_report(report: &RunReport, output_dir: &Path, with_csv: bool) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let stem = report_stem(report);
    let mut written = Vec::new();

    let json_path = output_dir.join(format!("{stem}.json"));
    std::fs::write(&json_path, export_json(report)?)
        .with_context(|| format!("failed to write {}", json_path.display()))?;
    written.push(json_path);

    if with_csv {
        let trades_path = output_dir.join(format!("{stem}_trades.csv"));
        std::fs::write(&trades_path, export_trades_csv(&report.result.trades)?)
            .with_context(|| format!("failed to write {}", trades_path.display()))?;
        written.push(trades_path);

        let equity_path = output_dir.join(format!("{stem}_equity.csv"));
        std::fs::write(&equity_path, export_equity_csv(&report.result.equity_curve)?)
            .with_context(|| format!("failed to write {}", equity_path.display()))?;
        written.push(equity_path);
    }

    Ok(written)
}

/// Load a report written by [`save_report`].
pub fn load_report(path: &Path) -> Result<RunReport> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
