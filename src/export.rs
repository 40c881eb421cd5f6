// ABOUTME: Export of a job's collected time series as CSV or JSON
// ABOUTME: CSV carries primary-route rows only; JSON carries the job and every snapshot

use serde::Serialize;
use std::fmt::Write;
use std::str::FromStr;

use crate::store::{Job, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format '{}': expected csv or json", other)),
        }
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    job: &'a Job,
    snapshots: &'a [Snapshot],
}

pub const CSV_HEADER: &str = "collected_at,duration_seconds,distance_meters,duration_minutes";

pub fn to_csv(snapshots: &[Snapshot]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for snapshot in snapshots.iter().filter(|s| s.route_index == 0) {
        let minutes = snapshot
            .duration_seconds
            .map(|s| (s as f64 / 60.0).round() as i64);
        // writing to a String cannot fail
        let _ = writeln!(
            out,
            "{},{},{},{}",
            snapshot.collected_at.to_rfc3339(),
            opt(snapshot.duration_seconds),
            opt(snapshot.distance_meters),
            opt(minutes),
        );
    }

    out
}

pub fn to_json(job: &Job, snapshots: &[Snapshot]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonExport { job, snapshots })
}

pub fn render(format: ExportFormat, job: &Job, snapshots: &[Snapshot]) -> serde_json::Result<String> {
    match format {
        ExportFormat::Csv => Ok(to_csv(snapshots)),
        ExportFormat::Json => to_json(job, snapshots),
    }
}

fn opt(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
