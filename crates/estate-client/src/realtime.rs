use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use estate_types::events::{RealtimeCommand, RealtimeEvent, Topic};

use crate::error::ClientError;

/// How long to wait for `Ready` after identifying.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// An identified connection to the realtime gateway.
///
/// Subscriptions belong to the connection: dropping the stream closes the
/// socket and the server forgets them.
pub struct RealtimeStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RealtimeStream {
    /// Connect and authenticate. Resolves once the server sends `Ready`.
    pub async fn connect(url: &str, token: &str) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(url).await?;
        let mut stream = Self { ws };

        stream
            .command(&RealtimeCommand::Identify {
                token: token.to_string(),
            })
            .await?;

        let ready = tokio::time::timeout(READY_TIMEOUT, stream.next_event())
            .await
            .map_err(|_| ClientError::Realtime("no Ready from server".into()))?;
        match ready? {
            Some(RealtimeEvent::Ready { user_id }) => {
                info!("Realtime connected as {}", user_id);
                Ok(stream)
            }
            Some(other) => Err(ClientError::Realtime(format!(
                "expected Ready, got {:?}",
                other
            ))),
            None => Err(ClientError::Realtime("server closed during identify".into())),
        }
    }

    /// Ask for events on `topics`. The server answers with `Subscribed` for
    /// the accepted ones and `SubscribeDenied` for each refused one; both
    /// arrive through [`next_event`](Self::next_event).
    pub async fn subscribe(&mut self, topics: Vec<Topic>) -> Result<(), ClientError> {
        debug!("Subscribing to {:?}", topics);
        self.command(&RealtimeCommand::Subscribe { topics }).await
    }

    pub async fn unsubscribe(&mut self, topics: Vec<Topic>) -> Result<(), ClientError> {
        debug!("Unsubscribing from {:?}", topics);
        self.command(&RealtimeCommand::Unsubscribe { topics }).await
    }

    /// Next event from the server, or `None` once the socket closes.
    /// Unparsable frames are skipped.
    pub async fn next_event(&mut self) -> Result<Option<RealtimeEvent>, ClientError> {
        while let Some(frame) = self.ws.next().await {
            match frame? {
                Message::Text(text) => match serde_json::from_str(text.as_str()) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!("Skipping unparsable realtime frame: {}", e),
                },
                Message::Ping(_) => {
                    // tungstenite queues the pong; flush it out
                    self.ws.flush().await?;
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }

    async fn command(&mut self, command: &RealtimeCommand) -> Result<(), ClientError> {
        let json =
            serde_json::to_string(command).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.ws.send(Message::Text(json.into())).await?;
        Ok(())
    }
}
