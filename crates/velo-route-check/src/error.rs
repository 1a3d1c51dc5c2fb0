// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Run-level errors.
//!
//! Per-target failures (timeouts, unmatched responses, malformed frames) are
//! logged and skipped; only the errors below abort a run.

use crate::config::ConfigError;
use crate::portal::PortalError;
use std::time::Duration;
use thiserror::Error;

/// Shared channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Handshake failures. Without a token no request can be authorized.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("No handshake frame within {0:?}")]
    Timeout(Duration),

    #[error("Expected handshake frame, got: {0}")]
    UnexpectedFrame(String),

    #[error("Handshake frame carried no token")]
    MissingToken,
}

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Portal error: {0}")]
    Portal(#[from] PortalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for run-level operations.
pub type CheckResult<T> = Result<T, CheckError>;
