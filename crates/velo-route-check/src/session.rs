// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Diagnostic session: handshake, request batching and the collection loop.
//!
//! The session owns the pending request registry and the collected data and
//! runs as one cooperative task. It suspends only while waiting for the
//! handshake, for the next inbound frame and for a batch of sends, and every
//! receive is bounded so timeouts are swept even when the channel is idle.

use crate::channel::FrameChannel;
use crate::dispatch::{CollectedData, DispatchOutcome, Dispatcher};
use crate::error::{CheckResult, HandshakeError};
use crate::inventory::HubRecord;
use crate::protocol::InboundMessage;
use crate::retry::{AbandonedTarget, RetryPolicy, TimeoutSweep, DEFAULT_MAX_TRIES};
use crate::tracker::{RequestTracker, TargetKind, DEFAULT_EDGE_TIMEOUT, DEFAULT_GATEWAY_TIMEOUT};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Default wait for the handshake frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single receive in the collection loop.
pub const DEFAULT_RECV_WAIT: Duration = Duration::from_secs(5);

/// Session timing and retry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    pub recv_wait: Duration,
    pub max_tries: u32,
    pub edge_timeout: Duration,
    pub gateway_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            recv_wait: DEFAULT_RECV_WAIT,
            max_tries: DEFAULT_MAX_TRIES,
            edge_timeout: DEFAULT_EDGE_TIMEOUT,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

/// Bookkeeping of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    /// Request frames written, retries included.
    pub frames_sent: usize,
    /// Responses that answered a pending request.
    pub responses: usize,
    /// Requests re-issued after a timeout.
    pub requeued: usize,
    /// Unsolicited responses and unknown actions.
    pub anomalies: usize,
    /// Frames that could not be decoded.
    pub malformed: usize,
    /// Targets dropped after exhausting their attempts.
    pub abandoned: Vec<AbandonedTarget>,
}

impl CollectionSummary {
    /// Whether every request was eventually answered.
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty()
    }

    pub fn abandoned_ids(&self, kind: TargetKind) -> impl Iterator<Item = &str> {
        self.abandoned
            .iter()
            .filter(move |a| a.kind == kind)
            .map(|a| a.target_id.as_str())
    }
}

/// Remote diagnostics session over a shared channel.
pub struct DiagSession<C> {
    channel: C,
    token: Option<String>,
    tracker: RequestTracker,
    dispatcher: Dispatcher,
    retry: RetryPolicy,
    options: SessionOptions,
    summary: CollectionSummary,
}

impl<C: FrameChannel> DiagSession<C> {
    pub fn new(channel: C, options: SessionOptions) -> Self {
        Self {
            channel,
            token: None,
            tracker: RequestTracker::new(),
            dispatcher: Dispatcher::new(),
            retry: RetryPolicy::new(options.max_tries),
            options,
            summary: CollectionSummary::default(),
        }
    }

    /// Wait for the token-bearing handshake frame.
    ///
    /// This is the first frame on a fresh channel; failure is fatal.
    pub async fn handshake(&mut self) -> CheckResult<()> {
        let wait = self.options.handshake_timeout;

        let text = match timeout(wait, self.channel.recv()).await {
            Ok(frame) => frame?,
            Err(_) => {
                error!("Failed to get remote diagnostics token within {:?}", wait);
                return Err(HandshakeError::Timeout(wait).into());
            }
        };

        match InboundMessage::decode(&text) {
            Ok(InboundMessage::Token { token: Some(token) }) => {
                info!("Received remote diagnostics token");
                self.token = Some(token);
                Ok(())
            }
            Ok(InboundMessage::Token { token: None }) => {
                error!("Handshake frame carried no token");
                Err(HandshakeError::MissingToken.into())
            }
            _ => {
                error!("Failed to get remote diagnostics token");
                Err(HandshakeError::UnexpectedFrame(preview(&text)).into())
            }
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Queue a route dump request for an edge with the default timeout.
    pub fn request_edge_routes(&mut self, edge_id: &str) {
        let wait = self.options.edge_timeout;
        self.request_edge_routes_with_timeout(edge_id, wait);
    }

    pub fn request_edge_routes_with_timeout(&mut self, edge_id: &str, wait: Duration) {
        self.tracker.request_edge_routes(edge_id, wait);
    }

    /// Queue a route table request for a gateway with the default timeout.
    pub fn request_gateway_routes(
        &mut self,
        segment_id: i64,
        gateway_id: &str,
        enterprise_logical_id: &str,
    ) {
        let wait = self.options.gateway_timeout;
        self.request_gateway_routes_with_timeout(
            segment_id,
            gateway_id,
            enterprise_logical_id,
            wait,
        );
    }

    pub fn request_gateway_routes_with_timeout(
        &mut self,
        segment_id: i64,
        gateway_id: &str,
        enterprise_logical_id: &str,
        wait: Duration,
    ) {
        self.tracker
            .request_gateway_routes(segment_id, gateway_id, enterprise_logical_id, wait);
    }

    /// Send every queued request as one batch and wait for the writes.
    ///
    /// Returns the number of frames sent.
    pub async fn flush(&mut self) -> CheckResult<usize> {
        if !self.tracker.has_outbound() {
            return Ok(0);
        }

        let token = self
            .token
            .as_deref()
            .ok_or(HandshakeError::MissingToken)?;

        let frames = self
            .tracker
            .take_outbound()
            .iter()
            .map(|request| request.encode(token))
            .collect::<Result<Vec<_>, _>>()?;

        let count = frames.len();
        self.channel.send_batch(frames).await?;
        self.summary.frames_sent += count;
        debug!("Flushed {} requests", count);

        Ok(count)
    }

    /// Decode and dispatch one inbound frame.
    ///
    /// Malformed frames are logged and skipped.
    pub fn handle_frame(&mut self, text: &str) -> Option<DispatchOutcome> {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping malformed frame: {}", e);
                self.summary.malformed += 1;
                return None;
            }
        };

        let outcome = self.dispatcher.dispatch(&mut self.tracker, message);

        if let DispatchOutcome::Token(Some(token)) = &outcome {
            self.token = Some(token.clone());
        }
        if outcome.is_response() {
            self.summary.responses += 1;
        }
        if outcome.is_anomaly() {
            self.summary.anomalies += 1;
        }

        Some(outcome)
    }

    /// Re-issue or abandon requests whose deadline has passed.
    pub fn handle_request_timeouts(&mut self) -> TimeoutSweep {
        let sweep = self.retry.sweep(&mut self.tracker, Instant::now());
        self.summary.requeued += sweep.requeued;
        self.summary.abandoned.extend(sweep.abandoned.iter().cloned());
        sweep
    }

    pub fn pending_count(&self) -> usize {
        self.tracker.pending_count()
    }

    /// Collect responses until no request is pending.
    ///
    /// Only channel failures abort the loop; unanswered targets are retried
    /// and eventually abandoned, which guarantees termination.
    pub async fn run(&mut self) -> CheckResult<CollectionSummary> {
        self.flush().await?;

        while self.tracker.pending_count() > 0 {
            if self.handle_request_timeouts().needs_flush() {
                self.flush().await?;
            }

            if self.tracker.pending_count() == 0 {
                break;
            }

            match timeout(self.options.recv_wait, self.channel.recv()).await {
                Ok(Ok(text)) => {
                    self.handle_frame(&text);
                }
                Ok(Err(e)) => {
                    error!("Channel failed while collecting routes: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    debug!(
                        "No frame within {:?}, {} requests pending",
                        self.options.recv_wait,
                        self.tracker.pending_count()
                    );
                }
            }
        }

        let summary = &self.summary;
        info!(
            "Collection finished: {} sent, {} answered, {} requeued, {} abandoned, {} anomalies",
            summary.frames_sent,
            summary.responses,
            summary.requeued,
            summary.abandoned.len(),
            summary.anomalies
        );

        Ok(summary.clone())
    }

    pub fn collected(&self) -> &CollectedData {
        self.dispatcher.collected()
    }

    pub fn summary(&self) -> &CollectionSummary {
        &self.summary
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Consume the session, returning the channel and the collected data.
    pub fn into_parts(self) -> (C, CollectedData, CollectionSummary) {
        (self.channel, self.dispatcher.into_collected(), self.summary)
    }
}

/// Full collection pass over `channel`.
///
/// Performs the handshake, requests every hub's route dump, then every
/// gateway's route table for `segment_id`, and collects until nothing is
/// pending.
pub async fn collect_routes<C: FrameChannel>(
    channel: C,
    options: SessionOptions,
    hubs: &[HubRecord],
    gateways: &BTreeSet<String>,
    enterprise_logical_id: &str,
    segment_id: i64,
) -> CheckResult<(C, CollectedData, CollectionSummary)> {
    let mut session = DiagSession::new(channel, options);
    session.handshake().await?;

    for hub in hubs {
        session.request_edge_routes(&hub.logical_id);
    }
    session.flush().await?;

    for gateway in gateways {
        session.request_gateway_routes(segment_id, gateway, enterprise_logical_id);
    }
    session.flush().await?;

    session.run().await?;
    Ok(session.into_parts())
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
