// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Orchestrator portal client (JSON-RPC 2.0 over HTTPS).
//!
//! Used to look up the enterprise logical id, list hub edges and find the
//! gateways each hub peers with.

use crate::inventory::{EdgeRecord, GatewayResolver, HubRecord, RelevantGateways};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Page size used when listing edges.
pub const EDGE_PAGE_LIMIT: u32 = 500;

/// Prefix turning a peer `deviceLogicalId` into a gateway identity.
pub const GATEWAY_ID_PREFIX: &str = "gateway";

/// Portal errors
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Portal URL of an orchestrator.
pub fn portal_url(vco: &str) -> String {
    format!("https://{}/portal/", vco)
}

/// JSON-RPC request body.
pub fn rpc_body(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    })
}

/// Pull `result` out of a JSON-RPC response; anything else is an error
/// carrying the response itself.
pub fn extract_result(mut response: Value) -> Result<Value, PortalError> {
    if let Some(result) = response.get_mut("result") {
        return Ok(result.take());
    }

    Err(PortalError::Rpc(
        serde_json::to_string_pretty(&response).unwrap_or_else(|_| response.to_string()),
    ))
}

/// Gateway identity used on the diagnostics channel.
pub fn gateway_identity(device_logical_id: &str) -> String {
    format!("{}{}", GATEWAY_ID_PREFIX, device_logical_id)
}

/// Parameters of one `enterprise/getEnterpriseEdges` page.
pub fn edge_list_params(enterprise_id: u64, next_page: Option<&str>) -> Value {
    let mut params = json!({
        "enterpriseId": enterprise_id,
        "limit": EDGE_PAGE_LIMIT,
        "sortBy": [{"attribute": "edgeState", "type": "ASC"}],
        "with": ["ha"],
        "_filterSpec": true,
    });

    if let (Some(page), Some(obj)) = (next_page, params.as_object_mut()) {
        obj.insert("nextPageLink".into(), Value::String(page.to_string()));
    }

    params
}

/// Parameters of `edge/getEdgeSDWANPeers` restricted to gateway peers.
pub fn gateway_peer_params(enterprise_id: u64, edge_id: u64) -> Value {
    json!({
        "edgeId": edge_id,
        "enterpriseId": enterprise_id,
        "filters": {
            "and": [{"field": "peerType", "operator": "is", "value": "GATEWAY"}],
        },
        "_filterSpec": true,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMeta {
    #[serde(default)]
    more: bool,
    #[serde(default)]
    next_page_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgePage {
    #[serde(default)]
    data: Vec<EdgeRecord>,
    #[serde(default)]
    meta_data: PageMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SdwanPeer {
    #[serde(default)]
    device_logical_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PeerList {
    #[serde(default)]
    data: Vec<SdwanPeer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Enterprise {
    logical_id: String,
}

/// Gateway identities found in a peer list.
fn gateway_ids(peers: PeerList) -> BTreeSet<String> {
    peers
        .data
        .into_iter()
        .filter_map(|peer| peer.device_logical_id)
        .map(|id| gateway_identity(&id))
        .collect()
}

/// Portal client bound to one enterprise.
#[derive(Debug, Clone)]
pub struct PortalClient {
    client: Client,
    url: String,
    enterprise_id: u64,
}

impl PortalClient {
    pub fn new(
        vco: &str,
        api_token: &str,
        enterprise_id: u64,
        insecure_tls: bool,
    ) -> Result<Self, PortalError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Token {}", api_token))
            .map_err(|e| PortalError::Rpc(format!("Invalid token header: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);

        if insecure_tls {
            warn!("TLS certificate verification disabled for portal {}", vco);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;

        Ok(Self {
            client,
            url: portal_url(vco),
            enterprise_id,
        })
    }

    pub fn enterprise_id(&self) -> u64 {
        self.enterprise_id
    }

    /// Call a portal method and decode its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, PortalError> {
        debug!("Portal call {}", method);

        let response: Value = self
            .client
            .post(&self.url)
            .json(&rpc_body(method, params))
            .send()
            .await?
            .json()
            .await?;

        Ok(serde_json::from_value(extract_result(response)?)?)
    }

    /// Logical id of the enterprise.
    pub async fn enterprise_logical_id(&self) -> Result<String, PortalError> {
        let enterprise: Enterprise = self
            .call("enterprise/getEnterprise", json!({ "id": self.enterprise_id }))
            .await?;
        Ok(enterprise.logical_id)
    }

    /// Every edge of the enterprise, following pagination.
    pub async fn enterprise_edges(&self) -> Result<Vec<EdgeRecord>, PortalError> {
        let mut edges = Vec::new();
        let mut next_page: Option<String> = None;

        loop {
            let page: EdgePage = self
                .call(
                    "enterprise/getEnterpriseEdges",
                    edge_list_params(self.enterprise_id, next_page.as_deref()),
                )
                .await?;

            edges.extend(page.data);

            match page.meta_data {
                PageMeta {
                    more: true,
                    next_page_link: Some(link),
                } => next_page = Some(link),
                _ => break,
            }
        }

        debug!("Fetched {} edges", edges.len());
        Ok(edges)
    }

    /// Hub edges of the enterprise.
    pub async fn hub_edges(&self) -> Result<Vec<HubRecord>, PortalError> {
        let hubs: Vec<HubRecord> = self
            .enterprise_edges()
            .await?
            .into_iter()
            .filter_map(HubRecord::from_edge)
            .collect();

        info!("Found {} hubs", hubs.len());
        Ok(hubs)
    }

    /// Gateways an edge peers with.
    pub async fn gateway_peers(&self, edge_id: u64) -> Result<BTreeSet<String>, PortalError> {
        let peers: PeerList = self
            .call(
                "edge/getEdgeSDWANPeers",
                gateway_peer_params(self.enterprise_id, edge_id),
            )
            .await?;
        Ok(gateway_ids(peers))
    }
}

impl GatewayResolver for PortalClient {
    type Error = PortalError;

    async fn relevant_gateways(&self, hubs: &[HubRecord]) -> Result<RelevantGateways, PortalError> {
        let mut relevant = RelevantGateways::new();

        for hub in hubs {
            let gateways = match hub.id {
                Some(edge_id) => self.gateway_peers(edge_id).await?,
                None => {
                    warn!("Hub {} has no portal id, assuming no gateways", hub.logical_id);
                    BTreeSet::new()
                }
            };

            debug!("Hub {} peers with {} gateways", hub.logical_id, gateways.len());
            relevant.insert(hub.logical_id.clone(), gateways);
        }

        Ok(relevant)
    }
}
