// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SD-WAN Hub Route Audit
//!
//! Collects route tables from hub edges and the gateways they peer with over
//! the orchestrator's remote diagnostics channel, then reports destinations
//! that gateways advertise as edge-to-edge routes but that are absent from
//! the hub (or hub cluster) route table.
//!
//! # Features
//!
//! - **Request tracking**: one pending request per target, with deadlines
//! - **Retries**: timed-out requests are re-issued up to a bounded number of attempts
//! - **Batching**: queued requests are sent together over one shared channel
//! - **Reconciliation**: HA clusters are folded and compared as one unit
//!
//! # Quick Start
//!
//! ```bash
//! export VCO=vco.example.net ENT_ID=42 VCO_TOKEN=...
//! velo-route-check --hub-filter vp-igbn
//!
//! # Using config file
//! velo-route-check --config route-check.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! vco = "vco.example.net"
//! enterprise_id = 42
//! hub_name_filter = "vp-igbn"
//! max_tries = 5
//! gateway_timeout_secs = 40
//! ```

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod portal;
pub mod protocol;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod session;
pub mod tracker;
pub mod ws;

pub use channel::{memory_channel, FrameChannel, MemoryChannel, MemoryPeer};
pub use config::{CheckConfig, ConfigError};
pub use dispatch::{CollectedData, DispatchOutcome, Dispatcher};
pub use error::{ChannelError, CheckError, CheckResult, HandshakeError};
pub use inventory::{GatewayResolver, HubCache, HubRecord, RelevantGateways};
pub use portal::{PortalClient, PortalError};
pub use protocol::{Destination, EdgeRouteEntry, GatewayRouteEntry, InboundMessage, OutboundRequest};
pub use reconcile::{compute_route_deltas, ClusterReport, MissingRoute, RouteDeltaReport};
pub use report::ReportRow;
pub use retry::RetryPolicy;
pub use session::{collect_routes, CollectionSummary, DiagSession, SessionOptions};
pub use tracker::{RequestTracker, RouteRequest, TargetKind};
pub use ws::WsChannel;
