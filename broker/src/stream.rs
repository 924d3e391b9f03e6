// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_tungstenite::{tungstenite::protocol::Message, WebSocketStream};

use crate::error::Error;

/// Uniform byte-stream over the four transports MQTT is carried on here:
/// plain TCP, TLS TCP, WebSocket over TCP, WebSocket over TLS.
#[derive(Debug)]
pub enum Stream {
    Mqtt(TcpStream),
    Mqtts(Box<TlsStream<TcpStream>>),
    Ws(Box<WebSocketStream<TcpStream>>),
    Wss(Box<WebSocketStream<TlsStream<TcpStream>>>),
}

impl Stream {
    /// Appends whatever is immediately available to `buf`. Returns `0` on
    /// a clean EOF.
    ///
    /// # Errors
    /// Returns an error if the underlying socket/stream fails.
    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp) => Ok(tcp.read_buf(buf).await?),
            Self::Mqtts(tls) => Ok(tls.read_buf(buf).await?),
            Self::Ws(ws) => Self::read_ws_frame(ws.as_mut(), buf).await,
            Self::Wss(wss) => Self::read_ws_frame(wss.as_mut(), buf).await,
        }
    }

    async fn read_ws_frame<S>(
        stream: &mut WebSocketStream<S>,
        buf: &mut Vec<u8>,
    ) -> Result<usize, Error>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        match stream.next().await {
            Some(msg) => {
                let data = msg?.into_data();
                let n = data.len();
                buf.extend_from_slice(&data);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    /// Writes the full contents of `buf`, framing it as one binary
    /// WebSocket message where applicable.
    ///
    /// # Errors
    /// Returns an error if the underlying socket/stream fails.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp) => Ok(tcp.write(buf).await?),
            Self::Mqtts(tls) => Ok(tls.write(buf).await?),
            Self::Ws(ws) => {
                ws.send(Message::binary(buf.to_vec())).await?;
                Ok(buf.len())
            }
            Self::Wss(wss) => {
                wss.send(Message::binary(buf.to_vec())).await?;
                Ok(buf.len())
            }
        }
    }

    /// Idempotent close: errors closing an already-closed stream are
    /// swallowed, matching the spec's "close is idempotent" requirement.
    pub async fn close(&mut self) {
        let _ = match self {
            Self::Mqtt(tcp) => tcp.shutdown().await,
            Self::Mqtts(tls) => tls.shutdown().await,
            Self::Ws(ws) => ws.close(None).await.map_err(std::convert::Into::into),
            Self::Wss(wss) => wss.close(None).await.map_err(std::convert::Into::into),
        };
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            Self::Mqtt(tcp) => tcp.peer_addr().ok(),
            Self::Mqtts(tls) => tls.get_ref().0.peer_addr().ok(),
            Self::Ws(ws) => ws.get_ref().peer_addr().ok(),
            Self::Wss(wss) => wss.get_ref().get_ref().0.peer_addr().ok(),
        }
    }
}
