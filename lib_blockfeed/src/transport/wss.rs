//! # WebSocket Transport
//!
//! [`Transport`] over `tokio-tungstenite`. Text frames are passed through,
//! control frames are consumed here, and a close frame or end of stream is
//! reported as a clean close.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

use super::{Connection, Transport, TransportError};

/// Opens WebSocket connections with `connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Creates the transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, uri: &str) -> Result<Box<dyn Connection>, TransportError> {
        log::debug!("Opening WebSocket to {}", uri);
        let (stream, _response) = connect_async(uri).await.map_err(|e| TransportError::Open {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(WsConnection { stream }))
    }
}

/// A live tungstenite stream.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(bin)) => match String::from_utf8(bin.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => log::debug!("Ignoring non UTF-8 binary frame ({} bytes)", bin.len()),
                },
                Ok(Message::Close(frame)) => {
                    log::info!("WebSocket closed by remote host: {:?}", frame);
                    return None;
                }
                // Ping, Pong and raw frames are handled by tungstenite itself.
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("Error closing WebSocket: {}", e);
        }
    }
}
