// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound message dispatch and collected route data.

use crate::protocol::{DiagnosticOutput, EdgeRouteEntry, GatewayRouteEntry, InboundMessage};
use crate::tracker::{RequestTracker, TargetKind};
use std::collections::HashMap;

/// Filtered routes collected during a run.
///
/// Each response replaces the previous list for its device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedData {
    /// Gateway id -> `edge2edge` routes.
    pub gateway_routes: HashMap<String, Vec<GatewayRouteEntry>>,

    /// Edge id -> `Edge` routes.
    pub edge_routes: HashMap<String, Vec<EdgeRouteEntry>>,
}

impl CollectedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the route list of a gateway, keeping `edge2edge` entries only.
    pub fn replace_gateway_routes(
        &mut self,
        gateway_id: &str,
        routes: Vec<GatewayRouteEntry>,
    ) -> usize {
        let filtered: Vec<_> = routes.into_iter().filter(|r| r.is_edge_to_edge()).collect();
        let count = filtered.len();
        self.gateway_routes.insert(gateway_id.to_string(), filtered);
        count
    }

    /// Replace the route list of an edge, keeping `Edge` entries only.
    pub fn replace_edge_routes(&mut self, edge_id: &str, routes: Vec<EdgeRouteEntry>) -> usize {
        let filtered: Vec<_> = routes.into_iter().filter(|r| r.is_edge_route()).collect();
        let count = filtered.len();
        self.edge_routes.insert(edge_id.to_string(), filtered);
        count
    }
}

/// Result of dispatching one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handshake or token refresh.
    Token(Option<String>),

    /// Edge route dump stored.
    EdgeRoutes {
        logical_id: String,
        routes: usize,
        matched: bool,
    },

    /// Edge answered without output; nothing stored.
    EdgeNoOutput { logical_id: String, matched: bool },

    /// Edge answered with a route dump that could not be parsed; nothing stored.
    EdgeUndecodable {
        logical_id: String,
        error: String,
        matched: bool,
    },

    /// Gateway route table stored.
    GatewayRoutes {
        logical_id: String,
        routes: usize,
        matched: bool,
    },

    /// Diagnostics response for a test this engine does not request.
    UnsupportedTest { logical_id: String, test: String },

    /// Unknown action.
    Unrecognized { action: Option<String> },
}

impl DispatchOutcome {
    /// Whether the message answered a pending request.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Self::EdgeRoutes { matched: true, .. }
                | Self::EdgeNoOutput { matched: true, .. }
                | Self::EdgeUndecodable { matched: true, .. }
                | Self::GatewayRoutes { matched: true, .. }
        )
    }

    /// Whether the message is a protocol anomaly (unsolicited or unknown).
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            Self::EdgeRoutes { matched: false, .. }
                | Self::EdgeNoOutput { matched: false, .. }
                | Self::EdgeUndecodable { .. }
                | Self::GatewayRoutes { matched: false, .. }
                | Self::UnsupportedTest { .. }
                | Self::Unrecognized { .. }
        )
    }
}

/// Routes decoded messages to the tracker and collected data.
#[derive(Debug, Default)]
pub struct Dispatcher {
    collected: CollectedData,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collected(&self) -> &CollectedData {
        &self.collected
    }

    pub fn into_collected(self) -> CollectedData {
        self.collected
    }

    /// Apply one inbound message.
    pub fn dispatch(
        &mut self,
        tracker: &mut RequestTracker,
        message: InboundMessage,
    ) -> DispatchOutcome {
        match message {
            InboundMessage::Token { token } => {
                if token.is_some() {
                    tracing::info!("Received remote diagnostics token");
                } else {
                    tracing::warn!("Received noop frame without a token");
                }
                DispatchOutcome::Token(token)
            }

            InboundMessage::Diagnostics {
                logical_id,
                test,
                output,
            } => match output {
                DiagnosticOutput::RouteDump(routes) => {
                    let matched = complete(tracker, TargetKind::Edge, &logical_id);
                    let count = self.collected.replace_edge_routes(&logical_id, routes);
                    tracing::info!("Received {} routes for edge {}", count, logical_id);
                    DispatchOutcome::EdgeRoutes {
                        logical_id,
                        routes: count,
                        matched,
                    }
                }
                DiagnosticOutput::Empty => {
                    let matched = complete(tracker, TargetKind::Edge, &logical_id);
                    tracing::info!("No routes in response for edge {}", logical_id);
                    DispatchOutcome::EdgeNoOutput {
                        logical_id,
                        matched,
                    }
                }
                DiagnosticOutput::Undecodable(error) => {
                    let matched = complete(tracker, TargetKind::Edge, &logical_id);
                    tracing::warn!(
                        "Undecodable route dump from edge {}: {}",
                        logical_id,
                        error
                    );
                    DispatchOutcome::EdgeUndecodable {
                        logical_id,
                        error,
                        matched,
                    }
                }
                DiagnosticOutput::Unsupported => {
                    tracing::warn!(
                        "Ignoring {} diagnostics response from edge {}",
                        test,
                        logical_id
                    );
                    DispatchOutcome::UnsupportedTest { logical_id, test }
                }
            },

            InboundMessage::GatewayRouteTable { logical_id, routes } => {
                let matched = complete(tracker, TargetKind::Gateway, &logical_id);
                let count = self.collected.replace_gateway_routes(&logical_id, routes);
                tracing::info!("Received {} routes for gateway {}", count, logical_id);
                DispatchOutcome::GatewayRoutes {
                    logical_id,
                    routes: count,
                    matched,
                }
            }

            InboundMessage::Unrecognized { action } => {
                tracing::warn!("Unrecognized message action: {:?}", action);
                DispatchOutcome::Unrecognized { action }
            }
        }
    }
}

fn complete(tracker: &mut RequestTracker, kind: TargetKind, logical_id: &str) -> bool {
    if tracker.complete(kind, logical_id).is_some() {
        tracing::debug!("Removed {} {} from pending list", kind, logical_id);
        true
    } else {
        tracing::warn!("{} {} not in pending list", kind, logical_id);
        false
    }
}
