// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Missing-route CSV and route dump output.

use crate::inventory::HubRecord;
use crate::reconcile::RouteDeltaReport;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// CSV header of the missing-route report.
pub const CSV_HEADER: [&str; 3] = ["hub_id", "route", "peers"];

/// File name of the full route dump.
pub const ROUTES_DUMP_FILE: &str = "routes_dump.json";

/// One missing route, ready for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// Hub display name, or the cluster id when it is not a single hub.
    pub hub: String,
    /// `addr/mask`
    pub route: String,
    /// `[p1 p2 ...]`
    pub peers: String,
}

/// Turn missing routes into report rows.
pub fn report_rows(report: &RouteDeltaReport, hubs: &[HubRecord]) -> Vec<ReportRow> {
    let names: HashMap<&str, &str> = hubs
        .iter()
        .map(|hub| (hub.logical_id.as_str(), hub.name.as_str()))
        .collect();

    report
        .missing
        .iter()
        .map(|missing| {
            let hub = names
                .get(missing.cluster_id.as_str())
                .copied()
                .unwrap_or(missing.cluster_id.as_str());

            ReportRow {
                hub: hub.to_string(),
                route: missing.destination.to_string(),
                peers: format!(
                    "[{}]",
                    missing.peers.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
                ),
            }
        })
        .collect()
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write rows as CSV, header first.
pub fn write_csv<W: Write>(mut out: W, rows: &[ReportRow]) -> io::Result<()> {
    writeln!(out, "{}", CSV_HEADER.join(","))?;
    for row in rows {
        writeln!(
            out,
            "{},{},{}",
            csv_field(&row.hub),
            csv_field(&row.route),
            csv_field(&row.peers)
        )?;
    }
    out.flush()
}

/// Path of the missing-route report for a run started at `timestamp`.
pub fn missing_routes_path(dir: &Path, timestamp: i64) -> PathBuf {
    dir.join(format!("missing_routes_{}.csv", timestamp))
}

/// Write the missing-route report and return its path.
pub fn write_missing_routes(dir: &Path, timestamp: i64, rows: &[ReportRow]) -> io::Result<PathBuf> {
    let path = missing_routes_path(dir, timestamp);
    let file = File::create(&path)?;
    write_csv(BufWriter::new(file), rows)?;
    Ok(path)
}

/// Expected and actual routes of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterDump {
    pub expected: Vec<String>,
    pub actual: Vec<String>,
    /// Every member hub returned its routes.
    pub complete: bool,
}

/// Per-cluster dump of every expected and actual route.
pub fn routes_dump(report: &RouteDeltaReport) -> BTreeMap<String, ClusterDump> {
    report
        .clusters
        .iter()
        .map(|(cluster_id, cluster)| {
            (
                cluster_id.clone(),
                ClusterDump {
                    expected: cluster.expected.keys().map(ToString::to_string).collect(),
                    actual: cluster.actual.iter().map(ToString::to_string).collect(),
                    complete: cluster.complete(),
                },
            )
        })
        .collect()
}

/// Write `routes_dump.json` into `dir` and return its path.
pub fn write_routes_dump(dir: &Path, report: &RouteDeltaReport) -> io::Result<PathBuf> {
    let path = dir.join(ROUTES_DUMP_FILE);
    let json = serde_json::to_string_pretty(&routes_dump(report)).map_err(io::Error::other)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
