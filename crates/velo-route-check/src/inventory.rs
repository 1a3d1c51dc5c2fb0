// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hub inventory: hub records, HA metadata, gateway relevance and the
//! on-disk hub cache.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

/// Hub logical id -> gateway ids the hub peers with.
pub type RelevantGateways = BTreeMap<String, BTreeSet<String>>;

/// HA cluster data of an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaData {
    #[serde(default)]
    pub cluster_id: Option<u64>,
    #[serde(default)]
    pub cluster_name: Option<String>,
}

/// HA configuration of an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaInfo {
    #[serde(default)]
    pub data: Option<HaData>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Edge as listed by the portal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub logical_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub edge_state: Option<String>,
    #[serde(default)]
    pub activation_state: Option<String>,
    #[serde(default)]
    pub is_hub: Option<bool>,
    #[serde(default)]
    pub ha: Option<HaInfo>,
}

/// A hub edge taking part in reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubRecord {
    /// Portal numeric id, needed to query SD-WAN peers.
    #[serde(default)]
    pub id: Option<u64>,
    pub logical_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ha: Option<HaInfo>,
}

impl HubRecord {
    pub fn new(logical_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            logical_id: logical_id.into(),
            name: name.into(),
            ha: None,
        }
    }

    /// Place this hub in an HA cluster.
    pub fn with_cluster(mut self, cluster_name: impl Into<String>) -> Self {
        self.ha = Some(HaInfo {
            data: Some(HaData {
                cluster_id: None,
                cluster_name: Some(cluster_name.into()),
            }),
            kind: Some("CLUSTER".into()),
        });
        self
    }

    /// Build a hub from a portal edge; `None` for non-hubs and edges
    /// without a logical id.
    pub fn from_edge(edge: EdgeRecord) -> Option<Self> {
        if edge.is_hub != Some(true) {
            return None;
        }

        Some(Self {
            id: edge.id,
            logical_id: edge.logical_id?,
            name: edge.name.unwrap_or_default(),
            ha: edge.ha,
        })
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.ha
            .as_ref()
            .and_then(|ha| ha.data.as_ref())
            .and_then(|data| data.cluster_name.as_deref())
    }

    /// Identity used for reconciliation: the HA cluster name, else the hub's
    /// own logical id.
    pub fn cluster_id(&self) -> &str {
        self.cluster_name().unwrap_or(&self.logical_id)
    }
}

/// Keep hubs whose name contains `filter` (case-insensitive).
pub fn filter_hubs_by_name(hubs: Vec<HubRecord>, filter: Option<&str>) -> Vec<HubRecord> {
    let Some(filter) = filter.map(str::to_lowercase).filter(|f| !f.is_empty()) else {
        return hubs;
    };

    hubs.into_iter()
        .filter(|hub| hub.name.to_lowercase().contains(&filter))
        .collect()
}

/// De-duplicated set of gateways used by any hub.
pub fn gateway_set(relevant: &RelevantGateways) -> BTreeSet<String> {
    relevant.values().flatten().cloned().collect()
}

/// Resolves which gateways each hub peers with.
pub trait GatewayResolver {
    type Error;

    fn relevant_gateways(
        &self,
        hubs: &[HubRecord],
    ) -> impl Future<Output = Result<RelevantGateways, Self::Error>> + Send;
}

/// Hubs cached for one enterprise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEnterprise {
    #[serde(default)]
    pub hubs: Vec<HubRecord>,
}

/// On-disk cache of hub lists, keyed by enterprise id.
#[derive(Debug, Clone)]
pub struct HubCache {
    path: PathBuf,
    entries: BTreeMap<String, CachedEnterprise>,
}

impl HubCache {
    /// Load the cache; a missing or unreadable file yields an empty cache.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable hub cache {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) => {
                tracing::debug!("No hub cache at {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached hubs for an enterprise; `None` when absent or empty.
    pub fn hubs(&self, enterprise_id: u64) -> Option<&[HubRecord]> {
        self.entries
            .get(&enterprise_id.to_string())
            .map(|e| e.hubs.as_slice())
            .filter(|hubs| !hubs.is_empty())
    }

    pub fn store(&mut self, enterprise_id: u64, hubs: Vec<HubRecord>) {
        self.entries
            .entry(enterprise_id.to_string())
            .or_default()
            .hubs = hubs;
    }

    pub fn save(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.entries).map_err(io::Error::other)?;
        std::fs::write(&self.path, json)
    }
}
