//! Websocket transport split into a shared writer and a single reader.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::GatewayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a websocket to `url`, bounded by `limit`.
pub(crate) async fn dial(url: &str, limit: Duration) -> Result<(WsSender, WsReceiver), GatewayError> {
    let (ws_stream, _) = timeout(limit, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| GatewayError::Timeout {
            stage: "dial",
            after: limit,
        })?
        .map_err(|e| GatewayError::Dial(format!("failed to connect to {url}: {e}")))?;

    debug!(url, "websocket connected");

    let (write, read) = ws_stream.split();
    Ok((
        WsSender {
            sink: Mutex::new(write),
            write_timeout: limit,
        },
        WsReceiver { stream: read },
    ))
}

/// Write half. Safe to share between the pacemaker, the dispatch loop
/// and user sends; writes are serialized by an internal lock.
pub(crate) struct WsSender {
    sink: Mutex<SplitSink<WsStream, Message>>,
    write_timeout: Duration,
}

impl WsSender {
    /// Send one encoded frame as a text message.
    pub(crate) async fn send(&self, bytes: Vec<u8>) -> Result<(), GatewayError> {
        let text = String::from_utf8(bytes)
            .map_err(|e| GatewayError::Transport(format!("frame is not valid UTF-8: {e}")))?;
        trace!(frame = %text, "sending frame");

        let mut sink = self.sink.lock().await;
        timeout(self.write_timeout, sink.send(Message::Text(text.into())))
            .await
            .map_err(|_| GatewayError::Timeout {
                stage: "write",
                after: self.write_timeout,
            })?
            .map_err(|e| GatewayError::Transport(format!("failed to send frame: {e}")))
    }

    /// Send a close frame and shut the write half.
    pub(crate) async fn close(&self) -> Result<(), GatewayError> {
        let mut sink = self.sink.lock().await;
        timeout(self.write_timeout, sink.close())
            .await
            .map_err(|_| GatewayError::Timeout {
                stage: "close",
                after: self.write_timeout,
            })?
            .map_err(|e| GatewayError::Transport(format!("failed to close websocket: {e}")))
    }
}

/// Read half. Owned by exactly one task at a time.
pub(crate) struct WsReceiver {
    stream: SplitStream<WsStream>,
}

impl WsReceiver {
    /// Next data message's payload.
    ///
    /// Control messages are skipped. A close frame or the end of the stream
    /// yields [`GatewayError::StreamClosed`].
    pub(crate) async fn recv(&mut self) -> Result<Vec<u8>, GatewayError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_bytes().to_vec()),
                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "websocket closed by remote");
                    return Err(GatewayError::StreamClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(GatewayError::Transport(format!("failed to read frame: {e}")));
                }
                None => return Err(GatewayError::StreamClosed),
            }
        }
    }
}
