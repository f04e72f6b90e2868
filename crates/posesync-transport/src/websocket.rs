//! WebSocket chunk source

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::{CapacityError, ProtocolError};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use posesync_core::{PoseError, PoseResult};

use crate::{Chunk, ChunkSource};

/// Protocol limits matching the assembler's cap, so an oversized message is
/// refused while it is being read instead of after it has been buffered
pub fn websocket_config(frame_buffer_cap: usize) -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(frame_buffer_cap),
        max_frame_size: Some(frame_buffer_cap),
        ..WebSocketConfig::default()
    }
}

/// A client WebSocket connection
pub struct WebSocketSource<S = MaybeTlsStream<TcpStream>> {
    stream: WebSocketStream<S>,
    peer: String,
}

impl WebSocketSource {
    /// Connect and complete the opening handshake
    pub async fn connect(endpoint: &str, frame_buffer_cap: usize) -> PoseResult<Self> {
        let config = websocket_config(frame_buffer_cap);
        let (stream, response) = connect_async_with_config(endpoint, Some(config), true)
            .await
            .map_err(|e| PoseError::ConnectFailed(format!("{}: {}", endpoint, e)))?;

        debug!(endpoint, status = %response.status(), "websocket handshake complete");

        Ok(Self {
            stream,
            peer: endpoint.to_string(),
        })
    }
}

impl<S> WebSocketSource<S> {
    /// Wrap an already established stream
    pub fn from_stream(stream: WebSocketStream<S>, peer: impl Into<String>) -> Self {
        Self {
            stream,
            peer: peer.into(),
        }
    }
}

#[async_trait]
impl<S> ChunkSource for WebSocketSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn next_chunk(&mut self) -> PoseResult<Chunk> {
        match self.stream.next().await {
            None => Ok(Chunk::Closed {
                code: None,
                reason: String::new(),
            }),
            Some(Ok(message)) => Ok(message_to_chunk(message)),
            Some(Err(err)) => map_error(err),
        }
    }

    async fn close(&mut self) -> PoseResult<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {}
            // The peer closed first and our reply is still queued
            Err(WsError::Protocol(ProtocolError::SendAfterClosing)) => {
                match SinkExt::flush(&mut self.stream).await {
                    Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {}
                    Err(err) => return Err(PoseError::ShutdownError(err.to_string())),
                }
            }
            Err(err) => return Err(PoseError::ShutdownError(err.to_string())),
        }

        // Read until the peer's close reply ends the stream
        while let Some(message) = self.stream.next().await {
            if message.is_err() {
                break;
            }
        }
        Ok(())
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

fn message_to_chunk(message: Message) -> Chunk {
    match message {
        Message::Text(text) => Chunk::message(text.into_bytes()),
        Message::Binary(data) => Chunk::message(data),
        Message::Frame(frame) => {
            let fin = frame.header().is_final;
            Chunk::Data {
                bytes: frame.into_data(),
                fin,
            }
        }
        Message::Close(frame) => match frame {
            Some(frame) => Chunk::Closed {
                code: Some(u16::from(frame.code)),
                reason: frame.reason.into_owned(),
            },
            None => Chunk::Closed {
                code: None,
                reason: String::new(),
            },
        },
        // Pongs are queued by tungstenite itself
        Message::Ping(_) | Message::Pong(_) => Chunk::Control,
    }
}

fn map_error(err: WsError) -> PoseResult<Chunk> {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Ok(Chunk::Closed {
            code: None,
            reason: String::new(),
        }),
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            Err(PoseError::FrameTooLarge {
                size,
                limit: max_size,
            })
        }
        WsError::Capacity(other) => Err(PoseError::InvalidFraming(other.to_string())),
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            Err(PoseError::ConnectionReset)
        }
        WsError::Protocol(other) => Err(PoseError::InvalidFraming(other.to_string())),
        other => Err(PoseError::TransportError(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair(cap: usize) -> (WebSocketSource<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (client_io, server_io) = duplex(64 * 1024);
        let client =
            WebSocketStream::from_raw_socket(client_io, Role::Client, Some(websocket_config(cap)))
                .await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (WebSocketSource::from_stream(client, "duplex"), server)
    }

    #[tokio::test]
    async fn test_text_and_binary_are_complete_messages() {
        let (mut source, mut server) = pair(1024).await;

        server.send(Message::Text("{\"pose\":[]}".into())).await.unwrap();
        server.send(Message::Binary(b"{}".to_vec())).await.unwrap();

        assert_eq!(source.next_chunk().await.unwrap(), Chunk::message("{\"pose\":[]}"));
        assert_eq!(source.next_chunk().await.unwrap(), Chunk::message("{}"));
        assert_eq!(source.peer(), "duplex");
    }

    #[tokio::test]
    async fn test_oversized_message_is_framing_error() {
        let (mut source, mut server) = pair(256).await;

        server.send(Message::Binary(vec![b'x'; 1024])).await.unwrap();

        let err = source.next_chunk().await.unwrap_err();
        assert!(matches!(err, PoseError::FrameTooLarge { limit: 256, .. }));
    }

    #[tokio::test]
    async fn test_peer_close_reports_code() {
        let (mut source, mut server) = pair(1024).await;

        server.close(None).await.unwrap();

        match source.next_chunk().await.unwrap() {
            Chunk::Closed { .. } => {}
            other => panic!("unexpected: {:?}", other),
        }

        // The server reads our close reply, then hangs up
        let server_task = tokio::spawn(async move {
            let mut got_reply = false;
            while let Some(Ok(message)) = server.next().await {
                if matches!(message, Message::Close(_)) {
                    got_reply = true;
                }
            }
            got_reply
        });
        source.close().await.unwrap();
        assert!(server_task.await.unwrap(), "close reply never reached the peer");
    }

    #[tokio::test]
    async fn test_local_close_completes_handshake() {
        let (mut source, mut server) = pair(1024).await;

        let server_task = tokio::spawn(async move {
            let mut saw_close = false;
            while let Some(Ok(message)) = server.next().await {
                if matches!(message, Message::Close(_)) {
                    saw_close = true;
                }
            }
            saw_close
        });
        source.close().await.unwrap();
        assert!(server_task.await.unwrap());
    }
}
