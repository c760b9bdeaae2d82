//! ==============================================================================
//! stats.rs - offline summary of the remote log
//! ==============================================================================
//!
//! purpose:
//!     `plant-buddy-node summarize export.json` - a quick look at what the
//!     node has been posting, without a notebook.
//!
//! accepted shapes:
//!     {"plants": {"plant1": {"logs": {"<push id>": {record}, ...}}}}
//!     {"logs": {...}}
//!     {"<push id>": {record}, ...}
//!     [{record}, ...]
//!
//! timestamps above EPOCH_THRESHOLD_MS are wall-clock; smaller ones were
//! posted before the node's first time sync and are device uptime.
//! sentinel temperature/humidity values are left out of those fields' stats
//! and of every correlation pair they appear in.
//!
//! ==============================================================================

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::domain::{HUM_INVALID_PCT, TEMP_INVALID_C};
use crate::presentation::present_label;

pub const EPOCH_THRESHOLD_MS: i64 = 10_000_000_000;
const ROLLING_WINDOW: usize = 5;
const FIELDS: [&str; 4] = ["soil_raw", "light_raw", "temp_c", "hum"];

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: i64,
    pub soil_raw: f64,
    pub light_raw: f64,
    pub temp_c: f64,
    pub hum: f64,
    pub mood: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl FieldStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let (mut count, mut sum) = (0usize, 0.0);
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in values {
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        (count > 0).then(|| Self { count, min, max, mean: sum / count as f64 })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeBase {
    Epoch,
    Uptime,
    Mixed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub records: usize,
    pub skipped: usize,
    pub time_base: TimeBase,
    /// (first, last) timestamp of the records on the dominant time base
    pub span_ms: (i64, i64),
    pub soil: Option<FieldStats>,
    pub light: Option<FieldStats>,
    pub temp: Option<FieldStats>,
    pub hum: Option<FieldStats>,
    pub moods: BTreeMap<String, usize>,
    /// mean of soil/light/temp/hum over the last ROLLING_WINDOW records
    pub recent: [Option<f64>; 4],
    /// pearson r between FIELDS, pairwise over records valid in both;
    /// None where fewer than two pairs exist or a side never varies
    pub correlations: [[Option<f64>; 4]; 4],
}

pub fn load_entries<P: AsRef<Path>>(path: P) -> Result<(Vec<LogEntry>, usize)> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
    let value: serde_json::Value = serde_json::from_str(&text).context("export is not valid json")?;
    Ok(extract_entries(&value))
}

/// Pull every record out of an export. Returns (parsed, unparseable count).
pub fn extract_entries(value: &serde_json::Value) -> (Vec<LogEntry>, usize) {
    let mut entries = Vec::new();
    let mut skipped = 0;
    collect(value, &mut entries, &mut skipped);
    entries.sort_by_key(|e| e.timestamp);
    (entries, skipped)
}

fn collect(value: &serde_json::Value, out: &mut Vec<LogEntry>, skipped: &mut usize) {
    use serde_json::Value;
    match value {
        Value::Array(items) => items.iter().for_each(|v| push_record(v, out, skipped)),
        Value::Object(map) => {
            if let Some(plants) = map.get("plants").and_then(Value::as_object) {
                plants.values().for_each(|p| collect(p, out, skipped));
            } else if let Some(logs) = map.get("logs") {
                collect(logs, out, skipped);
            } else {
                map.values().for_each(|v| push_record(v, out, skipped));
            }
        }
        _ => *skipped += 1,
    }
}

fn push_record(value: &serde_json::Value, out: &mut Vec<LogEntry>, skipped: &mut usize) {
    match serde_json::from_value::<LogEntry>(value.clone()) {
        Ok(e) => out.push(e),
        Err(_) => *skipped += 1,
    }
}

/// FIELDS[i] of a record, or None for a climate sentinel
fn field_value(e: &LogEntry, i: usize) -> Option<f64> {
    match i {
        0 => Some(e.soil_raw),
        1 => Some(e.light_raw),
        2 => (e.temp_c != TEMP_INVALID_C as f64).then_some(e.temp_c),
        _ => (e.hum != HUM_INVALID_PCT as f64).then_some(e.hum),
    }
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let (sx, sy) = pairs.iter().fold((0.0, 0.0), |(a, b), (x, y)| (a + x, b + y));
    let (mx, my) = (sx / n, sy / n);
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

fn correlations(entries: &[LogEntry]) -> [[Option<f64>; 4]; 4] {
    let mut out = [[None; 4]; 4];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let pairs: Vec<(f64, f64)> = entries
                .iter()
                .filter_map(|e| Some((field_value(e, i)?, field_value(e, j)?)))
                .collect();
            *cell = pearson(&pairs);
        }
    }
    out
}

pub fn summarize(entries: &[LogEntry], skipped: usize) -> Summary {
    let epoch: Vec<i64> =
        entries.iter().map(|e| e.timestamp).filter(|&t| t > EPOCH_THRESHOLD_MS).collect();
    let time_base = match (epoch.len(), entries.len()) {
        (0, _) => TimeBase::Uptime,
        (n, total) if n == total => TimeBase::Epoch,
        _ => TimeBase::Mixed,
    };
    let span_ms = match time_base {
        TimeBase::Uptime => (
            entries.first().map(|e| e.timestamp).unwrap_or(0),
            entries.last().map(|e| e.timestamp).unwrap_or(0),
        ),
        _ => (epoch[0], epoch[epoch.len() - 1]),
    };

    let temps = || entries.iter().map(|e| e.temp_c).filter(|&t| t != TEMP_INVALID_C as f64);
    let hums = || entries.iter().map(|e| e.hum).filter(|&h| h != HUM_INVALID_PCT as f64);

    let mut moods = BTreeMap::new();
    for e in entries {
        *moods.entry(e.mood.clone()).or_insert(0) += 1;
    }

    let tail = &entries[entries.len().saturating_sub(ROLLING_WINDOW)..];
    let mean = |vals: Vec<f64>| {
        (!vals.is_empty()).then(|| vals.iter().sum::<f64>() / vals.len() as f64)
    };
    let recent = [
        mean(tail.iter().map(|e| e.soil_raw).collect()),
        mean(tail.iter().map(|e| e.light_raw).collect()),
        mean(tail.iter().map(|e| e.temp_c).filter(|&t| t != TEMP_INVALID_C as f64).collect()),
        mean(tail.iter().map(|e| e.hum).filter(|&h| h != HUM_INVALID_PCT as f64).collect()),
    ];

    Summary {
        records: entries.len(),
        skipped,
        time_base,
        span_ms,
        soil: FieldStats::from_values(entries.iter().map(|e| e.soil_raw)),
        light: FieldStats::from_values(entries.iter().map(|e| e.light_raw)),
        temp: FieldStats::from_values(temps()),
        hum: FieldStats::from_values(hums()),
        moods,
        recent,
        correlations: correlations(entries),
    }
}

pub fn render(s: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== MONITORING PERIOD ===");
    let hours = (s.span_ms.1 - s.span_ms.0) as f64 / 3_600_000.0;
    match s.time_base {
        TimeBase::Uptime => {
            let _ = writeln!(out, "Time base: device uptime (no time sync)");
        }
        base => {
            let fmt = |ms: i64| {
                chrono::DateTime::from_timestamp_millis(ms)
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| ms.to_string())
            };
            let _ = writeln!(out, "Start: {}", fmt(s.span_ms.0));
            let _ = writeln!(out, "End: {}", fmt(s.span_ms.1));
            if base == TimeBase::Mixed {
                let _ = writeln!(out, "Note: some records predate time sync");
            }
        }
    }
    let _ = writeln!(out, "Total duration: {:.1} hours ({:.1} days)", hours, hours / 24.0);
    let _ = writeln!(out, "Number of readings: {} ({} unparseable)", s.records, s.skipped);

    let _ = writeln!(out, "\n=== SENSOR STATISTICS ===");
    for (name, stats) in FIELDS.iter().zip([s.soil, s.light, s.temp, s.hum]) {
        match stats {
            Some(f) => {
                let _ = writeln!(
                    out,
                    "{:<10} n={:<5} min={:<8.1} max={:<8.1} mean={:.1}",
                    name, f.count, f.min, f.max, f.mean
                );
            }
            None => {
                let _ = writeln!(out, "{:<10} no valid values", name);
            }
        }
    }

    let _ = writeln!(out, "\n=== MOOD DISTRIBUTION ===");
    for (mood, n) in &s.moods {
        let pct = 100.0 * *n as f64 / s.records.max(1) as f64;
        let glyph = present_label(mood).glyph;
        let _ = writeln!(out, "{:<10} {:<4} {:>5} ({:.1}%)", mood, glyph, n, pct);
    }

    let _ = writeln!(out, "\n=== CORRELATIONS ===");
    let _ = write!(out, "{:<10}", "");
    for name in FIELDS {
        let _ = write!(out, " {:>9}", name);
    }
    let _ = writeln!(out);
    for (name, row) in FIELDS.iter().zip(&s.correlations) {
        let _ = write!(out, "{:<10}", name);
        for r in row {
            match r {
                Some(r) => {
                    let _ = write!(out, " {:>9.2}", r);
                }
                None => {
                    let _ = write!(out, " {:>9}", "-");
                }
            }
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "\n=== LAST {} READINGS (mean) ===", ROLLING_WINDOW);
    for (name, v) in FIELDS.iter().zip(s.recent) {
        match v {
            Some(v) => {
                let _ = writeln!(out, "{:<10} {:.1}", name, v);
            }
            None => {
                let _ = writeln!(out, "{:<10} -", name);
            }
        }
    }
    out
}
