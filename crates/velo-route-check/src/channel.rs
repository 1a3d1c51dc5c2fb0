// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Duplex frame channel abstraction.
//!
//! The engine talks to the orchestrator through a single duplex channel of
//! JSON text frames. [`crate::ws::WsChannel`] is the websocket implementation;
//! [`MemoryChannel`] is an in-process pair for replays and tests.

use crate::error::ChannelError;
use std::future::Future;
use tokio::sync::mpsc;

/// A duplex channel of text frames.
pub trait FrameChannel: Send {
    /// Send one frame.
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Send a group of frames and wait until all of them are written.
    fn send_batch(
        &mut self,
        frames: Vec<String>,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send {
        async move {
            for frame in frames {
                self.send(frame).await?;
            }
            Ok(())
        }
    }

    /// Receive the next frame. Must be cancel-safe: callers wrap it in a
    /// timeout.
    fn recv(&mut self) -> impl Future<Output = Result<String, ChannelError>> + Send;
}

/// Engine side of an in-process channel.
#[derive(Debug)]
pub struct MemoryChannel {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
}

/// Remote side of an in-process channel.
#[derive(Debug)]
pub struct MemoryPeer {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
}

/// Create a connected in-process channel pair.
pub fn memory_channel() -> (MemoryChannel, MemoryPeer) {
    let (to_peer, from_engine) = mpsc::unbounded_channel();
    let (to_engine, from_peer) = mpsc::unbounded_channel();

    (
        MemoryChannel {
            outgoing: to_peer,
            incoming: from_peer,
        },
        MemoryPeer {
            outgoing: to_engine,
            incoming: from_engine,
        },
    )
}

impl FrameChannel for MemoryChannel {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.outgoing.send(frame).map_err(|_| ChannelError::Closed)
    }

    async fn recv(&mut self) -> Result<String, ChannelError> {
        self.incoming.recv().await.ok_or(ChannelError::Closed)
    }
}

impl MemoryPeer {
    /// Deliver a frame to the engine.
    pub fn send(&self, frame: impl Into<String>) -> Result<(), ChannelError> {
        self.outgoing
            .send(frame.into())
            .map_err(|_| ChannelError::Closed)
    }

    /// Next frame sent by the engine; `None` once the engine side is dropped.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Frames sent by the engine and not yet received.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.incoming.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_channel_roundtrip() {
        let (mut engine, mut peer) = memory_channel();

        engine.send("ping".into()).await.expect("send");
        assert_eq!(peer.recv().await.as_deref(), Some("ping"));

        peer.send("pong").expect("peer send");
        assert_eq!(engine.recv().await.expect("recv"), "pong");
    }

    #[tokio::test]
    async fn test_memory_channel_batch_and_drain() {
        let (mut engine, mut peer) = memory_channel();

        engine
            .send_batch(vec!["a".into(), "b".into(), "c".into()])
            .await
            .expect("batch");
        assert_eq!(peer.drain(), vec!["a", "b", "c"]);
        assert!(peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_memory_channel_closed() {
        let (mut engine, peer) = memory_channel();
        drop(peer);

        assert!(matches!(engine.recv().await, Err(ChannelError::Closed)));
        assert!(matches!(
            engine.send("x".into()).await,
            Err(ChannelError::Closed)
        ));
    }
}
