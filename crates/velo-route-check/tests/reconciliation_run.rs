// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Full collection runs over an in-memory channel with a scripted peer.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use velo_route_check::inventory::{gateway_set, RelevantGateways};
use velo_route_check::report::report_rows;
use velo_route_check::{
    collect_routes, compute_route_deltas, memory_channel, ChannelError, CheckError,
    HandshakeError, HubRecord, MemoryPeer, SessionOptions, TargetKind,
};

const ENTERPRISE: &str = "ent-logical";

fn options() -> SessionOptions {
    SessionOptions {
        handshake_timeout: Duration::from_secs(5),
        recv_wait: Duration::from_secs(1),
        max_tries: 3,
        edge_timeout: Duration::from_secs(2),
        gateway_timeout: Duration::from_secs(2),
    }
}

fn relevant(pairs: &[(&str, &str)]) -> RelevantGateways {
    let mut rel = RelevantGateways::new();
    for (hub, gateway) in pairs {
        rel.entry(hub.to_string())
            .or_default()
            .insert(gateway.to_string());
    }
    rel
}

fn gw_entry(addr: &str, mask: &str, kind: &str, peer: &str) -> Value {
    json!({
        "networkAddr": addr,
        "networkMask": mask,
        "type": kind,
        "peerName": peer,
        "reachable": true,
        "metric": 0,
        "preference": 0,
        "flags": "",
        "lostReason": ""
    })
}

fn edge_entry(route_type: &str, addr: &str, mask: &str) -> Value {
    json!({"route_type": route_type, "route_address": addr, "route_netmask": mask})
}

fn gateway_reply(id: &str, entries: Vec<Value>) -> String {
    json!({
        "action": "getGwRouteTable",
        "data": {"logicalId": id, "result": entries}
    })
    .to_string()
}

fn edge_reply(id: &str, entries: Vec<Value>) -> String {
    let output = json!({"ROUTE_DUMP": {"result": [entries]}}).to_string();
    json!({
        "action": "runDiagnostics",
        "data": {"logicalId": id, "test": "ROUTE_DUMP", "results": {"output": output}}
    })
    .to_string()
}

fn target(request: &Value) -> (&str, &str) {
    (
        request["action"].as_str().unwrap_or_default(),
        request["data"]["logicalId"].as_str().unwrap_or_default(),
    )
}

/// Play the orchestrator: send the handshake, then answer each request with
/// whatever `respond` returns. Yields every request seen once the engine
/// side is dropped.
fn spawn_peer<F>(mut peer: MemoryPeer, mut respond: F) -> JoinHandle<Vec<Value>>
where
    F: FnMut(&Value) -> Vec<String> + Send + 'static,
{
    tokio::spawn(async move {
        peer.send(r#"{"action":"noop","token":"diag-token"}"#)
            .expect("handshake");

        let mut seen = Vec::new();
        while let Some(frame) = peer.recv().await {
            let request: Value = serde_json::from_str(&frame).expect("request is JSON");
            for reply in respond(&request) {
                let _ = peer.send(reply);
            }
            seen.push(request);
        }
        seen
    })
}

fn count_requests(seen: &[Value], action: &str, id: &str) -> usize {
    seen.iter().filter(|r| target(r) == (action, id)).count()
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_missing_route() {
    let hubs = vec![HubRecord::new("H", "H")];
    let rel = relevant(&[("H", "G")]);

    let (channel, peer) = memory_channel();
    let responder = spawn_peer(peer, |request| match target(request) {
        ("runDiagnostics", "H") => vec![edge_reply("H", vec![])],
        ("getGwRouteTable", "G") => vec![gateway_reply(
            "G",
            vec![gw_entry("10.0.0.0", "24", "edge2edge", "H")],
        )],
        _ => vec![],
    });

    let (channel, collected, summary) =
        collect_routes(channel, options(), &hubs, &gateway_set(&rel), ENTERPRISE, 0)
            .await
            .expect("collection");
    drop(channel);

    let seen = responder.await.expect("responder");
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|r| r["token"] == "diag-token"));
    let gw_request = seen
        .iter()
        .find(|r| target(r).0 == "getGwRouteTable")
        .expect("gateway request");
    assert_eq!(gw_request["data"]["enterpriseLogicalId"], ENTERPRISE);
    assert_eq!(gw_request["data"]["segmentId"], 0);

    assert!(summary.is_complete());
    assert_eq!(summary.responses, 2);

    let report = compute_route_deltas(&hubs, &rel, &collected);
    let rows = report_rows(&report, &hubs);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].hub, "H");
    assert_eq!(rows[0].route, "10.0.0.0/24");
    assert_eq!(rows[0].peers, "[H]");
    assert!(report.clusters["H"].complete());
}

#[tokio::test(start_paused = true)]
async fn test_silent_edge_gets_exactly_max_tries_requests() {
    let hubs = vec![HubRecord::new("H", "hub")];
    let rel = relevant(&[("H", "G")]);

    let (channel, peer) = memory_channel();
    let responder = spawn_peer(peer, |request| match target(request) {
        ("getGwRouteTable", "G") => vec![gateway_reply("G", vec![])],
        _ => vec![],
    });

    let (channel, collected, summary) =
        collect_routes(channel, options(), &hubs, &gateway_set(&rel), ENTERPRISE, 0)
            .await
            .expect("collection");
    drop(channel);

    let seen = responder.await.expect("responder");
    assert_eq!(count_requests(&seen, "runDiagnostics", "H"), 3);
    assert_eq!(count_requests(&seen, "getGwRouteTable", "G"), 1);

    assert!(!collected.edge_routes.contains_key("H"));
    assert!(collected.gateway_routes.contains_key("G"));
    assert_eq!(summary.abandoned_ids(TargetKind::Edge).collect::<Vec<_>>(), vec!["H"]);
    assert_eq!(summary.abandoned[0].attempts, 3);
    assert_eq!(summary.requeued, 2);

    let report = compute_route_deltas(&hubs, &rel, &collected);
    assert!(!report.clusters["H"].complete());
    assert_eq!(report.clusters["H"].uncollected_members, vec!["H".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_run_terminates_with_mixed_targets() {
    let hubs = vec![
        HubRecord::new("H1", "hub-1"),
        HubRecord::new("H2", "hub-2"),
        HubRecord::new("H3", "hub-3"),
    ];
    let rel = relevant(&[("H1", "G1"), ("H2", "G1"), ("H3", "G2")]);

    let (channel, peer) = memory_channel();
    let responder = spawn_peer(peer, |request| match target(request) {
        ("runDiagnostics", id @ ("H1" | "H2")) => vec![edge_reply(id, vec![])],
        ("getGwRouteTable", "G1") => vec![gateway_reply("G1", vec![])],
        _ => vec![],
    });

    let started = tokio::time::Instant::now();
    let (channel, collected, summary) =
        collect_routes(channel, options(), &hubs, &gateway_set(&rel), ENTERPRISE, 0)
            .await
            .expect("collection");
    drop(channel);
    let elapsed = started.elapsed();

    let seen = responder.await.expect("responder");
    assert_eq!(count_requests(&seen, "runDiagnostics", "H3"), 3);
    assert_eq!(count_requests(&seen, "getGwRouteTable", "G2"), 3);
    assert_eq!(count_requests(&seen, "runDiagnostics", "H1"), 1);

    assert_eq!(summary.abandoned.len(), 2);
    assert_eq!(summary.abandoned_ids(TargetKind::Gateway).collect::<Vec<_>>(), vec!["G2"]);
    assert_eq!(collected.edge_routes.len(), 2);
    assert_eq!(collected.gateway_routes.len(), 1);

    // Each attempt lasts its timeout plus at most one receive wait
    assert!(elapsed <= Duration::from_secs(3 * (2 + 1) + 1), "took {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_gateway_response_replaces() {
    let hubs = vec![HubRecord::new("H", "hub")];
    let rel = relevant(&[("H", "G")]);

    let (channel, peer) = memory_channel();
    // Hold the edge reply until both gateway copies are queued
    let responder = spawn_peer(peer, |request| match target(request) {
        ("getGwRouteTable", "G") => vec![
            gateway_reply(
                "G",
                vec![
                    gw_entry("10.1.0.0", "16", "edge2edge", "E1"),
                    gw_entry("10.2.0.0", "16", "edge2edge", "E2"),
                ],
            ),
            gateway_reply(
                "G",
                vec![
                    gw_entry("10.3.0.0", "16", "edge2edge", "E3"),
                    gw_entry("10.4.0.0", "16", "datacenter", "DC"),
                ],
            ),
            edge_reply("H", vec![]),
        ],
        _ => vec![],
    });

    let (channel, collected, summary) =
        collect_routes(channel, options(), &hubs, &gateway_set(&rel), ENTERPRISE, 0)
            .await
            .expect("collection");
    drop(channel);
    responder.await.expect("responder");

    let routes = &collected.gateway_routes["G"];
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].destination().to_string(), "10.3.0.0/16");
    assert_eq!(summary.anomalies, 1);
    assert_eq!(summary.responses, 2);
}

#[tokio::test(start_paused = true)]
async fn test_snake_case_gateway_entries_are_reported() {
    let hubs = vec![HubRecord::new("H", "H")];
    let rel = relevant(&[("H", "G")]);

    let (channel, peer) = memory_channel();
    let responder = spawn_peer(peer, |request| match target(request) {
        ("runDiagnostics", "H") => vec![edge_reply("H", vec![])],
        ("getGwRouteTable", "G") => vec![gateway_reply(
            "G",
            vec![json!({
                "network_addr": "10.0.0.0",
                "network_mask": "24",
                "type": "edge2edge",
                "peer_name": "H"
            })],
        )],
        _ => vec![],
    });

    let (channel, collected, _) =
        collect_routes(channel, options(), &hubs, &gateway_set(&rel), ENTERPRISE, 0)
            .await
            .expect("collection");
    drop(channel);
    responder.await.expect("responder");

    assert_eq!(collected.gateway_routes["G"].len(), 1);

    let report = compute_route_deltas(&hubs, &rel, &collected);
    let rows = report_rows(&report, &hubs);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].route, "10.0.0.0/24");
    assert_eq!(rows[0].peers, "[H]");
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_edge_output_is_not_retried() {
    let hubs = vec![HubRecord::new("H", "hub")];
    let rel = relevant(&[("H", "G")]);

    let (channel, peer) = memory_channel();
    let responder = spawn_peer(peer, |request| match target(request) {
        ("runDiagnostics", "H") => vec![json!({
            "action": "runDiagnostics",
            "data": {"logicalId": "H", "test": "ROUTE_DUMP", "results": {"output": "{oops"}}
        })
        .to_string()],
        ("getGwRouteTable", "G") => vec![gateway_reply("G", vec![])],
        _ => vec![],
    });

    let (channel, collected, summary) =
        collect_routes(channel, options(), &hubs, &gateway_set(&rel), ENTERPRISE, 0)
            .await
            .expect("collection");
    drop(channel);

    let seen = responder.await.expect("responder");
    assert_eq!(count_requests(&seen, "runDiagnostics", "H"), 1);
    assert!(summary.is_complete());
    assert_eq!(summary.anomalies, 1);
    assert!(!collected.edge_routes.contains_key("H"));
}

#[tokio::test(start_paused = true)]
async fn test_only_relevant_route_types_are_kept() {
    let hubs = vec![HubRecord::new("H", "hub")];
    let rel = relevant(&[("H", "G")]);

    let (channel, peer) = memory_channel();
    let responder = spawn_peer(peer, |request| match target(request) {
        ("runDiagnostics", "H") => vec![edge_reply(
            "H",
            vec![
                edge_entry("Edge", "10.1.0.0", "16"),
                edge_entry("Static", "10.2.0.0", "16"),
            ],
        )],
        ("getGwRouteTable", "G") => vec![gateway_reply(
            "G",
            vec![
                gw_entry("10.1.0.0", "16", "edge2edge", "E1"),
                gw_entry("10.9.0.0", "16", "other", "X"),
            ],
        )],
        _ => vec![],
    });

    let (channel, collected, _) =
        collect_routes(channel, options(), &hubs, &gateway_set(&rel), ENTERPRISE, 0)
            .await
            .expect("collection");
    drop(channel);
    responder.await.expect("responder");

    let gw: Vec<String> = collected.gateway_routes["G"]
        .iter()
        .map(|r| r.destination().to_string())
        .collect();
    assert_eq!(gw, vec!["10.1.0.0/16"]);

    let edge: Vec<String> = collected.edge_routes["H"]
        .iter()
        .map(|r| r.destination().to_string())
        .collect();
    assert_eq!(edge, vec!["10.1.0.0/16"]);

    let report = compute_route_deltas(&hubs, &rel, &collected);
    assert!(report.missing.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cluster_folding_and_peer_union() {
    let hubs = vec![
        HubRecord::new("H1", "hub-a").with_cluster("C"),
        HubRecord::new("H2", "hub-b").with_cluster("C"),
    ];
    let rel = relevant(&[("H1", "G1"), ("H2", "G2")]);

    let (channel, peer) = memory_channel();
    let responder = spawn_peer(peer, |request| match target(request) {
        ("runDiagnostics", "H1") => vec![edge_reply("H1", vec![edge_entry("Edge", "10.1.0.0", "16")])],
        ("runDiagnostics", "H2") => vec![edge_reply("H2", vec![])],
        ("getGwRouteTable", "G1") => vec![gateway_reply(
            "G1",
            vec![
                gw_entry("10.1.0.0", "16", "edge2edge", "E1"),
                gw_entry("10.2.0.0", "16", "edge2edge", "E2"),
            ],
        )],
        ("getGwRouteTable", "G2") => vec![gateway_reply(
            "G2",
            vec![gw_entry("10.2.0.0", "16", "edge2edge", "E3")],
        )],
        _ => vec![],
    });

    let (channel, collected, _) =
        collect_routes(channel, options(), &hubs, &gateway_set(&rel), ENTERPRISE, 0)
            .await
            .expect("collection");
    drop(channel);
    responder.await.expect("responder");

    let report = compute_route_deltas(&hubs, &rel, &collected);
    assert_eq!(report.clusters.len(), 1);

    let rows = report_rows(&report, &hubs);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].hub, "C");
    assert_eq!(rows[0].route, "10.2.0.0/16");
    assert_eq!(rows[0].peers, "[E2 E3]");
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout_aborts_run() {
    let hubs = vec![HubRecord::new("H", "hub")];
    let (channel, _peer) = memory_channel();

    let result = collect_routes(channel, options(), &hubs, &BTreeSet::new(), ENTERPRISE, 0).await;
    assert!(matches!(
        result,
        Err(CheckError::Handshake(HandshakeError::Timeout(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_channel_closed_mid_run() {
    let hubs = vec![HubRecord::new("H", "hub")];
    let (channel, mut peer) = memory_channel();

    let responder = tokio::spawn(async move {
        peer.send(r#"{"action":"noop","token":"t"}"#).expect("handshake");
        // Take the first request, then hang up
        peer.recv().await
    });

    let result = collect_routes(channel, options(), &hubs, &BTreeSet::new(), ENTERPRISE, 0).await;
    assert!(matches!(
        result,
        Err(CheckError::Channel(ChannelError::Closed))
    ));
    assert!(responder.await.expect("responder").is_some());
}
