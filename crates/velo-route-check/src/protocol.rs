// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote diagnostics wire protocol.
//!
//! Frames are JSON text messages on the orchestrator websocket. Every frame
//! carries an `action` discriminator; requests carry the session token and
//! responses carry the device `logicalId` used for correlation.
//!
//! ```json
//! // Edge route dump request
//! {"action":"runDiagnostics","data":{"logicalId":"<edge>","test":"ROUTE_DUMP",
//!  "parameters":{"segment":"all","prefix":"","routes":"all"},"resformat":"JSON"},
//!  "token":"<token>"}
//!
//! // Gateway route table request
//! {"action":"getGwRouteTable","data":{"segmentId":0,"logicalId":"<gw>",
//!  "enterpriseLogicalId":"<uuid>"},"token":"<token>"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Action carrying the session token.
pub const ACTION_NOOP: &str = "noop";
/// Edge diagnostic request/response action.
pub const ACTION_RUN_DIAGNOSTICS: &str = "runDiagnostics";
/// Gateway route table request/response action.
pub const ACTION_GW_ROUTE_TABLE: &str = "getGwRouteTable";

/// Diagnostic test name for a full edge route dump.
pub const ROUTE_DUMP_TEST: &str = "ROUTE_DUMP";

/// Edge route type retained from route dumps.
pub const EDGE_ROUTE_TYPE: &str = "Edge";
/// Gateway route type retained from route tables.
pub const GATEWAY_ROUTE_TYPE: &str = "edge2edge";

/// Inbound frame decoding errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Invalid message data: {0}")]
    InvalidData(String),

}

/// Destination prefix (network address + mask).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub netmask: String,
}

impl Destination {
    pub fn new(address: impl Into<String>, netmask: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            netmask: netmask.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.netmask)
    }
}

/// Route entry reported by a gateway route table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteEntry {
    #[serde(alias = "network_addr")]
    pub network_addr: String,
    #[serde(alias = "network_mask")]
    pub network_mask: String,
    /// Entry type (`edge2edge`, `datacenter`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Peer advertising the route.
    #[serde(default, alias = "peer_name")]
    pub peer_name: String,
    #[serde(default)]
    pub reachable: Option<bool>,
    #[serde(default)]
    pub metric: Option<i64>,
    #[serde(default)]
    pub preference: Option<i64>,
    #[serde(default)]
    pub flags: Option<String>,
    #[serde(default, alias = "lost_reason")]
    pub lost_reason: Option<String>,
}

impl GatewayRouteEntry {
    pub fn destination(&self) -> Destination {
        Destination::new(&self.network_addr, &self.network_mask)
    }

    /// Whether this entry is an edge-to-edge route.
    pub fn is_edge_to_edge(&self) -> bool {
        self.kind == GATEWAY_ROUTE_TYPE
    }
}

/// Route entry reported by an edge route dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRouteEntry {
    pub route_type: String,
    pub route_address: String,
    pub route_netmask: String,
}

impl EdgeRouteEntry {
    pub fn destination(&self) -> Destination {
        Destination::new(&self.route_address, &self.route_netmask)
    }

    /// Whether this entry was learned from another edge.
    pub fn is_edge_route(&self) -> bool {
        self.route_type == EDGE_ROUTE_TYPE
    }
}

/// Outbound route request.
///
/// The token is attached at send time so a refreshed token applies to
/// requests that are still queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundRequest {
    /// Full route dump across all segments of an edge.
    EdgeRouteDump { logical_id: String },

    /// Route table of a gateway for one segment.
    GatewayRouteTable {
        segment_id: i64,
        logical_id: String,
        enterprise_logical_id: String,
    },
}

#[derive(Serialize)]
struct Frame<'a, D> {
    action: &'a str,
    data: D,
    token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteDumpData<'a> {
    logical_id: &'a str,
    test: &'a str,
    parameters: RouteDumpParameters<'a>,
    resformat: &'a str,
}

#[derive(Serialize)]
struct RouteDumpParameters<'a> {
    segment: &'a str,
    prefix: &'a str,
    routes: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayRouteTableData<'a> {
    segment_id: i64,
    logical_id: &'a str,
    enterprise_logical_id: &'a str,
}

impl OutboundRequest {
    /// Logical id of the queried device.
    pub fn target(&self) -> &str {
        match self {
            Self::EdgeRouteDump { logical_id } => logical_id,
            Self::GatewayRouteTable { logical_id, .. } => logical_id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::EdgeRouteDump { .. } => ACTION_RUN_DIAGNOSTICS,
            Self::GatewayRouteTable { .. } => ACTION_GW_ROUTE_TABLE,
        }
    }

    /// Encode as a JSON text frame carrying `token`.
    pub fn encode(&self, token: &str) -> Result<String, serde_json::Error> {
        match self {
            Self::EdgeRouteDump { logical_id } => serde_json::to_string(&Frame {
                action: ACTION_RUN_DIAGNOSTICS,
                data: RouteDumpData {
                    logical_id,
                    test: ROUTE_DUMP_TEST,
                    parameters: RouteDumpParameters {
                        segment: "all",
                        prefix: "",
                        routes: "all",
                    },
                    resformat: "JSON",
                },
                token,
            }),
            Self::GatewayRouteTable {
                segment_id,
                logical_id,
                enterprise_logical_id,
            } => serde_json::to_string(&Frame {
                action: ACTION_GW_ROUTE_TABLE,
                data: GatewayRouteTableData {
                    segment_id: *segment_id,
                    logical_id,
                    enterprise_logical_id,
                },
                token,
            }),
        }
    }
}

/// Decoded payload of a `runDiagnostics` response.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticOutput {
    /// The device answered without any output.
    Empty,
    /// Entries of the first route dump result array.
    RouteDump(Vec<EdgeRouteEntry>),
    /// Output of a test this engine does not interpret.
    Unsupported,
    /// Route dump output that is not valid JSON; carries the parse error.
    Undecodable(String),
}

/// Inbound frame, decoded into the closed set of messages the engine handles.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Handshake / token refresh.
    Token { token: Option<String> },

    /// Edge diagnostics response.
    Diagnostics {
        logical_id: String,
        test: String,
        output: DiagnosticOutput,
    },

    /// Gateway route table response.
    GatewayRouteTable {
        logical_id: String,
        routes: Vec<GatewayRouteEntry>,
    },

    /// Any other action.
    Unrecognized { action: Option<String> },
}

impl InboundMessage {
    /// Decode an inbound text frame.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let frame: Value = serde_json::from_str(text)?;
        let frame = frame.as_object().ok_or(FrameError::NotAnObject)?;

        let action = frame.get("action").and_then(Value::as_str);

        let empty = serde_json::Map::new();
        let data = match frame.get("data") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(data)) => data,
            Some(other) => return Err(FrameError::InvalidData(other.to_string())),
        };

        let logical_id = data
            .get("logicalId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let message = match action {
            Some(ACTION_NOOP) => Self::Token {
                token: frame
                    .get("token")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            Some(ACTION_RUN_DIAGNOSTICS) => {
                let test = data
                    .get("test")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                let raw_output = data
                    .get("results")
                    .and_then(|r| r.get("output"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty());

                let output = match raw_output {
                    _ if test != ROUTE_DUMP_TEST => DiagnosticOutput::Unsupported,
                    None => DiagnosticOutput::Empty,
                    Some(raw) => match serde_json::from_str::<Value>(raw) {
                        Ok(decoded) => DiagnosticOutput::RouteDump(decode_entries(
                            first_route_dump_result(&decoded),
                        )),
                        Err(e) => DiagnosticOutput::Undecodable(e.to_string()),
                    },
                };

                Self::Diagnostics {
                    logical_id,
                    test,
                    output,
                }
            }
            Some(ACTION_GW_ROUTE_TABLE) => Self::GatewayRouteTable {
                routes: decode_entries(data.get("result")),
                logical_id,
            },
            other => Self::Unrecognized {
                action: other.map(str::to_string),
            },
        };

        Ok(message)
    }
}

/// `ROUTE_DUMP.result[0]` of a decoded diagnostics output.
fn first_route_dump_result(output: &Value) -> Option<&Value> {
    output
        .get(ROUTE_DUMP_TEST)
        .and_then(|dump| dump.get("result"))
        .and_then(|result| result.get(0))
}

/// Decode each element of a JSON array, skipping entries that don't fit `T`.
fn decode_entries<T: for<'de> Deserialize<'de>>(list: Option<&Value>) -> Vec<T> {
    let Some(items) = list.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Skipping malformed route entry: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_edge_request() {
        let req = OutboundRequest::EdgeRouteDump {
            logical_id: "edge-1".into(),
        };
        let frame: Value = serde_json::from_str(&req.encode("tok").expect("encode")).unwrap();

        assert_eq!(
            frame,
            json!({
                "action": "runDiagnostics",
                "data": {
                    "logicalId": "edge-1",
                    "test": "ROUTE_DUMP",
                    "parameters": {"segment": "all", "prefix": "", "routes": "all"},
                    "resformat": "JSON"
                },
                "token": "tok"
            })
        );
    }

    #[test]
    fn test_encode_gateway_request() {
        let req = OutboundRequest::GatewayRouteTable {
            segment_id: 0,
            logical_id: "gateway1".into(),
            enterprise_logical_id: "ent-uuid".into(),
        };
        let frame: Value = serde_json::from_str(&req.encode("tok").expect("encode")).unwrap();

        assert_eq!(frame["action"], "getGwRouteTable");
        assert_eq!(frame["data"]["segmentId"], 0);
        assert_eq!(frame["data"]["logicalId"], "gateway1");
        assert_eq!(frame["data"]["enterpriseLogicalId"], "ent-uuid");
        assert_eq!(frame["token"], "tok");
        assert_eq!(req.target(), "gateway1");
    }

    #[test]
    fn test_decode_noop() {
        let msg = InboundMessage::decode(r#"{"action":"noop","token":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Token {
                token: Some("abc".into())
            }
        );
    }

    #[test]
    fn test_decode_route_dump() {
        let output = json!({
            "ROUTE_DUMP": {"result": [[
                {"route_type": "Edge", "route_address": "10.1.0.0", "route_netmask": "24"},
                {"route_type": "Static", "route_address": "10.2.0.0", "route_netmask": "16"}
            ]]}
        })
        .to_string();
        let frame = json!({
            "action": "runDiagnostics",
            "data": {"logicalId": "edge-1", "test": "ROUTE_DUMP", "results": {"output": output}}
        })
        .to_string();

        match InboundMessage::decode(&frame).unwrap() {
            InboundMessage::Diagnostics {
                logical_id,
                output: DiagnosticOutput::RouteDump(routes),
                ..
            } => {
                assert_eq!(logical_id, "edge-1");
                assert_eq!(routes.len(), 2);
                assert_eq!(routes[0].destination().to_string(), "10.1.0.0/24");
                assert!(routes[0].is_edge_route());
                assert!(!routes[1].is_edge_route());
            }
            other => panic!("Expected route dump, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_output() {
        let frame = r#"{"action":"runDiagnostics","data":{"logicalId":"e","test":"ROUTE_DUMP","results":{"output":""}}}"#;
        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::Diagnostics { output, .. } => {
                assert_eq!(output, DiagnosticOutput::Empty)
            }
            other => panic!("Expected diagnostics, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_bad_output() {
        let frame = r#"{"action":"runDiagnostics","data":{"logicalId":"e","test":"ROUTE_DUMP","results":{"output":"{not json"}}}"#;
        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::Diagnostics {
                logical_id, output, ..
            } => {
                assert_eq!(logical_id, "e");
                assert!(matches!(output, DiagnosticOutput::Undecodable(_)));
            }
            other => panic!("Expected diagnostics, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_other_test_is_unsupported_even_when_empty() {
        for output in ["", r#"{\"ARP_DUMP\":{}}"#] {
            let frame = format!(
                r#"{{"action":"runDiagnostics","data":{{"logicalId":"e","test":"ARP_DUMP","results":{{"output":"{}"}}}}}}"#,
                output
            );
            match InboundMessage::decode(&frame).unwrap() {
                InboundMessage::Diagnostics { output, .. } => {
                    assert_eq!(output, DiagnosticOutput::Unsupported)
                }
                other => panic!("Expected diagnostics, got {:?}", other),
            }
        }

        let no_results = r#"{"action":"runDiagnostics","data":{"logicalId":"e","test":"ARP_DUMP"}}"#;
        match InboundMessage::decode(no_results).unwrap() {
            InboundMessage::Diagnostics { output, .. } => {
                assert_eq!(output, DiagnosticOutput::Unsupported)
            }
            other => panic!("Expected diagnostics, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_gateway_table_snake_case_fields() {
        let frame = r#"{"action":"getGwRouteTable","data":{"logicalId":"G","result":[{"network_addr":"10.0.0.0","network_mask":"24","type":"edge2edge","peer_name":"H","lost_reason":"none"}]}}"#;

        match InboundMessage::decode(frame).unwrap() {
            InboundMessage::GatewayRouteTable { logical_id, routes } => {
                assert_eq!(logical_id, "G");
                assert_eq!(routes.len(), 1);
                assert_eq!(routes[0].destination().to_string(), "10.0.0.0/24");
                assert_eq!(routes[0].peer_name, "H");
                assert_eq!(routes[0].lost_reason.as_deref(), Some("none"));
                assert!(routes[0].is_edge_to_edge());
            }
            other => panic!("Expected gateway table, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_gateway_table() {
        let frame = json!({
            "action": "getGwRouteTable",
            "data": {"logicalId": "gw", "result": [
                {"networkAddr": "10.0.0.0", "networkMask": "24", "type": "edge2edge", "peerName": "hub-a"},
                {"networkAddr": "10.9.0.0", "networkMask": "16", "type": "datacenter", "peerName": "dc"},
                {"garbage": true}
            ]}
        })
        .to_string();

        match InboundMessage::decode(&frame).unwrap() {
            InboundMessage::GatewayRouteTable { logical_id, routes } => {
                assert_eq!(logical_id, "gw");
                assert_eq!(routes.len(), 2);
                assert!(routes[0].is_edge_to_edge());
                assert!(!routes[1].is_edge_to_edge());
            }
            other => panic!("Expected gateway table, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unrecognized_and_invalid() {
        assert_eq!(
            InboundMessage::decode(r#"{"action":"edgeEvent","data":{}}"#).unwrap(),
            InboundMessage::Unrecognized {
                action: Some("edgeEvent".into())
            }
        );
        assert!(matches!(
            InboundMessage::decode(r#"{"action":"noop","data":[1]}"#),
            Err(FrameError::InvalidData(_))
        ));
        assert!(matches!(
            InboundMessage::decode("[]"),
            Err(FrameError::NotAnObject)
        ));
    }
}
