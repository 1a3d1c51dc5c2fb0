// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route delta computation.
//!
//! Hubs are folded into their HA cluster identity. For every cluster the
//! expected set is the union of `edge2edge` routes advertised by the gateways
//! its hubs peer with, and the actual set is the union of the `Edge` routes
//! in its hubs' route dumps. A destination is missing when it is expected but
//! absent from the actual set; correctness is judged per destination, not
//! per advertising peer.
//!
//! A hub whose route dump was never collected contributes nothing to the
//! actual set, so its cluster reports every expected destination as missing.
//! [`ClusterReport::complete`] tells callers whether that happened.

use crate::dispatch::CollectedData;
use crate::inventory::{HubRecord, RelevantGateways};
use crate::protocol::Destination;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Destination -> peers advertising it.
pub type ExpectedRoutes = BTreeMap<Destination, BTreeSet<String>>;

/// One missing destination for a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRoute {
    pub cluster_id: String,
    pub destination: Destination,
    pub peers: BTreeSet<String>,
}

/// Expected vs. actual routes of one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterReport {
    pub cluster_id: String,

    /// Hub logical ids folded into this cluster.
    pub members: Vec<String>,

    /// Members without a collected route dump.
    pub uncollected_members: Vec<String>,

    pub expected: ExpectedRoutes,
    pub actual: BTreeSet<Destination>,
}

impl ClusterReport {
    /// Whether every member hub returned a route dump.
    pub fn complete(&self) -> bool {
        self.uncollected_members.is_empty()
    }

    /// Expected destinations absent from the actual set.
    pub fn missing(&self) -> impl Iterator<Item = (&Destination, &BTreeSet<String>)> {
        self.expected
            .iter()
            .filter(move |(dest, _)| !self.actual.contains(*dest))
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteDeltaReport {
    pub clusters: BTreeMap<String, ClusterReport>,
    pub missing: Vec<MissingRoute>,
}

impl RouteDeltaReport {
    /// Clusters built from incomplete edge data.
    pub fn incomplete_clusters(&self) -> impl Iterator<Item = &ClusterReport> {
        self.clusters.values().filter(|c| !c.complete())
    }
}

/// Invert hub -> gateways into gateway -> hubs.
pub fn gateway_hubs(relevant: &RelevantGateways) -> HashMap<&str, BTreeSet<&str>> {
    let mut by_gateway: HashMap<&str, BTreeSet<&str>> = HashMap::new();

    for (hub_id, gateways) in relevant {
        for gateway_id in gateways {
            by_gateway
                .entry(gateway_id.as_str())
                .or_default()
                .insert(hub_id.as_str());
        }
    }

    by_gateway
}

/// Hub logical id -> cluster id.
pub fn hub_cluster_ids(hubs: &[HubRecord]) -> HashMap<&str, &str> {
    hubs.iter()
        .map(|hub| (hub.logical_id.as_str(), hub.cluster_id()))
        .collect()
}

/// Expected routes per cluster, from collected gateway route tables.
pub fn expected_routes(
    hubs: &[HubRecord],
    relevant: &RelevantGateways,
    collected: &CollectedData,
) -> BTreeMap<String, ExpectedRoutes> {
    let clusters = hub_cluster_ids(hubs);
    let by_gateway = gateway_hubs(relevant);

    let mut expected: BTreeMap<String, ExpectedRoutes> = clusters
        .values()
        .map(|cluster| (cluster.to_string(), ExpectedRoutes::new()))
        .collect();

    for (gateway_id, routes) in &collected.gateway_routes {
        let Some(hub_ids) = by_gateway.get(gateway_id.as_str()) else {
            tracing::debug!("Gateway {} is not used by any hub", gateway_id);
            continue;
        };

        for hub_id in hub_ids {
            let Some(cluster) = clusters.get(hub_id) else {
                tracing::debug!("Gateway {} lists unknown hub {}", gateway_id, hub_id);
                continue;
            };

            let entry = expected.entry(cluster.to_string()).or_default();
            for route in routes {
                entry
                    .entry(route.destination())
                    .or_default()
                    .insert(route.peer_name.clone());
            }
        }
    }

    expected
}

/// Actual routes per cluster, from collected edge route dumps.
pub fn actual_routes(
    hubs: &[HubRecord],
    collected: &CollectedData,
) -> BTreeMap<String, BTreeSet<Destination>> {
    let mut actual: BTreeMap<String, BTreeSet<Destination>> = BTreeMap::new();

    for hub in hubs {
        let set = actual.entry(hub.cluster_id().to_string()).or_default();
        if let Some(routes) = collected.edge_routes.get(&hub.logical_id) {
            set.extend(routes.iter().map(|r| r.destination()));
        }
    }

    actual
}

/// Compute missing routes for every cluster.
pub fn compute_route_deltas(
    hubs: &[HubRecord],
    relevant: &RelevantGateways,
    collected: &CollectedData,
) -> RouteDeltaReport {
    let mut expected = expected_routes(hubs, relevant, collected);
    let mut actual = actual_routes(hubs, collected);

    let mut clusters: BTreeMap<String, ClusterReport> = BTreeMap::new();
    for hub in hubs {
        let report = clusters
            .entry(hub.cluster_id().to_string())
            .or_insert_with(|| ClusterReport {
                cluster_id: hub.cluster_id().to_string(),
                ..Default::default()
            });
        report.members.push(hub.logical_id.clone());
        if !collected.edge_routes.contains_key(&hub.logical_id) {
            report.uncollected_members.push(hub.logical_id.clone());
        }
    }

    let mut missing = Vec::new();
    for (cluster_id, report) in clusters.iter_mut() {
        report.expected = expected.remove(cluster_id).unwrap_or_default();
        report.actual = actual.remove(cluster_id).unwrap_or_default();

        tracing::info!(
            "Hub {} has {} routes, expected {} routes",
            cluster_id,
            report.actual.len(),
            report.expected.len()
        );

        missing.extend(report.missing().map(|(dest, peers)| MissingRoute {
            cluster_id: cluster_id.clone(),
            destination: dest.clone(),
            peers: peers.clone(),
        }));
    }

    RouteDeltaReport { clusters, missing }
}
