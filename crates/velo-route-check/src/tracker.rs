// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending route request registry.
//!
//! Requests share one channel, so responses are correlated by device logical
//! id. A target has at most one outstanding request: a retry is only issued
//! after the previous entry has been removed from its pending map.

use crate::protocol::OutboundRequest;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default deadline for an edge route dump.
pub const DEFAULT_EDGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for a gateway route table.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(20);

/// Kind of device a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    Edge,
    Gateway,
}

impl TargetKind {
    fn other(self) -> Self {
        match self {
            Self::Edge => Self::Gateway,
            Self::Gateway => Self::Edge,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edge => write!(f, "edge"),
            Self::Gateway => write!(f, "gateway"),
        }
    }
}

/// State of an outstanding route request.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    /// Request to re-issue on retry.
    pub request: OutboundRequest,

    /// Absolute deadline.
    pub timeout_at: Instant,

    /// Deadline length, reused for the next attempt.
    pub timeout: Duration,

    /// Attempt number, starting at 1.
    pub attempt_count: u32,
}

impl RouteRequest {
    pub fn kind(&self) -> TargetKind {
        match self.request {
            OutboundRequest::EdgeRouteDump { .. } => TargetKind::Edge,
            OutboundRequest::GatewayRouteTable { .. } => TargetKind::Gateway,
        }
    }

    pub fn target_id(&self) -> &str {
        self.request.target()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.timeout_at < now
    }
}

/// Registry of pending edge and gateway route requests.
#[derive(Debug, Default)]
pub struct RequestTracker {
    pending_edges: HashMap<String, RouteRequest>,
    pending_gateways: HashMap<String, RouteRequest>,
    /// Requests queued for the next flush.
    outbound: Vec<OutboundRequest>,
    issued: usize,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full route dump request for an edge.
    pub fn request_edge_routes(
        &mut self,
        edge_id: impl Into<String>,
        timeout: Duration,
    ) -> &RouteRequest {
        let request = OutboundRequest::EdgeRouteDump {
            logical_id: edge_id.into(),
        };
        self.issue(request, timeout, 1, Instant::now())
    }

    /// Queue a route table request for a gateway.
    pub fn request_gateway_routes(
        &mut self,
        segment_id: i64,
        gateway_id: impl Into<String>,
        enterprise_logical_id: impl Into<String>,
        timeout: Duration,
    ) -> &RouteRequest {
        let request = OutboundRequest::GatewayRouteTable {
            segment_id,
            logical_id: gateway_id.into(),
            enterprise_logical_id: enterprise_logical_id.into(),
        };
        self.issue(request, timeout, 1, Instant::now())
    }

    /// Queue `request` and record it as pending with a fresh deadline.
    pub(crate) fn issue(
        &mut self,
        request: OutboundRequest,
        timeout: Duration,
        attempt_count: u32,
        now: Instant,
    ) -> &RouteRequest {
        let state = RouteRequest {
            request: request.clone(),
            timeout_at: now + timeout,
            timeout,
            attempt_count,
        };
        let kind = state.kind();
        let target = request.target().to_string();

        if self.pending_mut(kind.other()).remove(&target).is_some() {
            tracing::warn!(
                "Target {} was pending as {}, now requested as {}",
                target,
                kind.other(),
                kind
            );
        }

        tracing::info!(
            "Requesting routes for {} {} (attempt {})",
            kind,
            target,
            attempt_count
        );

        self.outbound.push(request);
        self.issued += 1;

        let pending = self.pending_mut(kind);
        pending.insert(target.clone(), state);
        &pending[&target]
    }

    /// Drain requests queued since the last flush.
    pub fn take_outbound(&mut self) -> Vec<OutboundRequest> {
        std::mem::take(&mut self.outbound)
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Total outstanding requests across both kinds.
    pub fn pending_count(&self) -> usize {
        tracing::debug!(
            "Pending edge count: {}, pending gateway count: {}",
            self.pending_edges.len(),
            self.pending_gateways.len()
        );
        self.pending_edges.len() + self.pending_gateways.len()
    }

    pub fn pending_edge_count(&self) -> usize {
        self.pending_edges.len()
    }

    pub fn pending_gateway_count(&self) -> usize {
        self.pending_gateways.len()
    }

    pub fn is_pending(&self, kind: TargetKind, target_id: &str) -> bool {
        self.pending(kind).contains_key(target_id)
    }

    pub fn get(&self, kind: TargetKind, target_id: &str) -> Option<&RouteRequest> {
        self.pending(kind).get(target_id)
    }

    /// Remove a target from pending because its response arrived.
    pub fn complete(&mut self, kind: TargetKind, target_id: &str) -> Option<RouteRequest> {
        self.pending_mut(kind).remove(target_id)
    }

    /// Remove and return every request whose deadline passed before `now`.
    ///
    /// Edges come first, then gateways; each group is ordered by deadline.
    pub fn take_expired(&mut self, now: Instant) -> Vec<RouteRequest> {
        let mut expired = Vec::new();

        for kind in [TargetKind::Edge, TargetKind::Gateway] {
            let pending = self.pending_mut(kind);
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, req)| req.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();

            let mut group: Vec<RouteRequest> =
                ids.iter().filter_map(|id| pending.remove(id)).collect();
            group.sort_by(|a, b| {
                a.timeout_at
                    .cmp(&b.timeout_at)
                    .then_with(|| a.target_id().cmp(b.target_id()))
            });
            expired.extend(group);
        }

        expired
    }

    /// Number of requests issued so far, retries included.
    pub fn issued_count(&self) -> usize {
        self.issued
    }

    fn pending(&self, kind: TargetKind) -> &HashMap<String, RouteRequest> {
        match kind {
            TargetKind::Edge => &self.pending_edges,
            TargetKind::Gateway => &self.pending_gateways,
        }
    }

    fn pending_mut(&mut self, kind: TargetKind) -> &mut HashMap<String, RouteRequest> {
        match kind {
            TargetKind::Edge => &mut self.pending_edges,
            TargetKind::Gateway => &mut self.pending_gateways,
        }
    }
}
