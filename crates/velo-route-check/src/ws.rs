// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Orchestrator websocket channel.

use crate::channel::FrameChannel;
use crate::error::ChannelError;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Websocket URL of an orchestrator.
pub fn websocket_url(vco: &str) -> String {
    format!("wss://{}/ws/", vco)
}

/// Websocket connection to the orchestrator remote diagnostics endpoint.
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsChannel {
    /// Connect to `wss://<vco>/ws/` with an API token.
    pub async fn connect(vco: &str, api_token: &str, insecure_tls: bool) -> Result<Self, ChannelError> {
        let url = websocket_url(vco);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::Connect(format!("Invalid URL {}: {}", url, e)))?;
        let auth = HeaderValue::from_str(&format!("Token {}", api_token))
            .map_err(|e| ChannelError::Connect(format!("Invalid token header: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let connector = if insecure_tls {
            warn!("TLS certificate verification disabled for {}", url);
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| ChannelError::Connect(format!("TLS setup failed: {}", e)))?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        info!("Connecting to {}", url);
        let (stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await
                .map_err(|e| ChannelError::Connect(e.to_string()))?;

        Ok(Self { stream })
    }

    /// Close the websocket.
    pub async fn close(mut self) -> Result<(), ChannelError> {
        self.stream.close(None).await?;
        Ok(())
    }
}

impl FrameChannel for WsChannel {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.stream.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn send_batch(&mut self, frames: Vec<String>) -> Result<(), ChannelError> {
        for frame in frames {
            self.stream.feed(Message::Text(frame.into())).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, ChannelError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_string()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(_) => warn!("Dropping non-UTF-8 binary frame ({} bytes)", bytes.len()),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("Websocket closed by peer: {:?}", frame);
                    return Err(ChannelError::Closed);
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite
                    debug!("Control frame received");
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ChannelError::Closed),
            }
        }
    }
}
