// WebSocket transport for the push channel.
//
// The driver talks to the network only through `Connector` and
// `FrameSource`, so tests can substitute in-memory fakes.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

use crate::error::ChannelError;

/// Opens one receive-only connection to the push endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrameSource>, ChannelError>;
}

/// An established connection delivering text frames.
#[async_trait]
pub trait FrameSource: Send {
    /// The next text payload. `None` means the server closed the connection
    /// cleanly; `Some(Err(_))` is a transport failure.
    async fn next_frame(&mut self) -> Option<Result<String, ChannelError>>;

    /// Close the connection from our side.
    async fn close(&mut self);
}

/// Connects to a fixed `ws://` broadcast endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        WsConnector { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FrameSource>, ChannelError> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect {
                url: self.url.clone(),
                message: e.to_string(),
            })?;
        info!("Connected to push endpoint {}", self.url);
        Ok(Box::new(WsFrameSource { ws }))
    }
}

/// An open push connection, handed out boxed by `WsConnector::connect`.
struct WsFrameSource<S> {
    ws: WebSocketStream<S>,
}

#[async_trait]
impl<S> FrameSource for WsFrameSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn next_frame(&mut self) -> Option<Result<String, ChannelError>> {
        next_text_frame(&mut self.ws).await
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!("Push channel close handshake failed: {}", e);
        }
    }
}

/// Pull the next text payload from a stream of WebSocket messages, skipping
/// binary, ping and pong frames. A close frame or the end of the stream
/// yields `None`.
pub async fn next_text_frame<St>(stream: &mut St) -> Option<Result<String, ChannelError>>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
            Ok(Message::Close(frame)) => {
                info!(?frame, "Push server sent close frame");
                return None;
            }
            Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            _ => {
                // Binary, Ping, Pong and raw frames carry no updates.
            }
        }
    }
    None
}
