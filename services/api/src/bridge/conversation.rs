//! Conversation Channel Adapter: the client socket to the conversational AI
//! backend.

use super::EventStream;
use callbridge_core::{
    conversation::{self, AiCommand, ConversationOverrides},
    endpoint::EndpointProvider,
    error::{BridgeError, Side},
    session::SessionInput,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt, stream, stream::SplitSink};
use std::{fmt::Display, sync::Arc, time::Duration};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info, trace, warn};

pub type AiSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type AiSink = SplitSink<AiSocket, WsMessage>;

/// An open, initialized conversation: its write half plus its inbound events.
pub struct ConversationLink {
    pub adapter: ConversationAdapter<AiSink>,
    pub events: EventStream,
}

/// Performs the AI handshake: acquire a signed endpoint, open the socket and
/// send the single `InitConversation` command.
///
/// The whole sequence is bounded by `timeout`; every failure is reported as
/// `AiUnavailable` and never retried.
pub async fn connect(
    endpoints: Arc<dyn EndpointProvider>,
    overrides: ConversationOverrides,
    timeout: Duration,
) -> Result<ConversationLink, BridgeError> {
    let handshake = async move {
        let url = endpoints
            .signed_url()
            .await
            .map_err(|e| BridgeError::AiUnavailable(e.to_string()))?;

        let (socket, _) = connect_async(url.as_str()).await.map_err(|e| {
            BridgeError::AiUnavailable(format!("failed to open conversation socket: {e}"))
        })?;
        info!("Connected to conversation backend.");

        let (sink, stream) = socket.split();
        let mut adapter = ConversationAdapter::new(sink);
        adapter
            .write(&AiCommand::InitConversation { overrides })
            .await
            .map_err(|e| BridgeError::AiUnavailable(e.to_string()))?;

        Ok::<_, BridgeError>(ConversationLink {
            adapter,
            events: events(stream),
        })
    };

    tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| {
            BridgeError::AiUnavailable(format!("handshake timed out after {timeout:?}"))
        })?
}

/// Turns the read half of the AI socket into a finite stream of session
/// inputs, ending with exactly one `AiClosed`.
pub fn events<St, E>(socket: St) -> EventStream
where
    St: Stream<Item = Result<WsMessage, E>> + Unpin + Send + 'static,
    E: Display + Send,
{
    stream::unfold(Some(socket), |socket| async move {
        let mut socket = socket?;
        loop {
            let closed = match socket.next().await {
                Some(Ok(WsMessage::Text(text))) => match conversation::decode_event(text.as_str()) {
                    Ok(event) => return Some((SessionInput::Ai(event), Some(socket))),
                    Err(err) => {
                        warn!(error = %err, raw = %err.raw, "Discarding malformed conversation frame");
                        continue;
                    }
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "Conversation backend sent close frame");
                    SessionInput::AiClosed { error: None }
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => SessionInput::AiClosed {
                    error: Some(err.to_string()),
                },
                None => SessionInput::AiClosed { error: None },
            };
            return Some((closed, None));
        }
    })
    .fuse()
    .boxed()
}

/// Write half of the AI socket. Same no-op-after-close contract as the
/// telephony adapter.
pub struct ConversationAdapter<S> {
    sink: Option<S>,
}

impl<S> ConversationAdapter<S>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    pub fn new(sink: S) -> Self {
        Self { sink: Some(sink) }
    }

    async fn send_user_audio(&mut self, payload: String) -> Result<(), BridgeError> {
        self.write(&AiCommand::UserAudio { payload }).await
    }

    async fn send_keepalive_reply(&mut self, ping_id: u64) -> Result<(), BridgeError> {
        self.write(&AiCommand::KeepaliveReply { ping_id }).await
    }

    /// Writes any command. `InitConversation` belongs to the handshake, so a
    /// second one is logged and dropped.
    pub async fn send(&mut self, cmd: AiCommand) -> Result<(), BridgeError> {
        match cmd {
            AiCommand::UserAudio { payload } => self.send_user_audio(payload).await,
            AiCommand::KeepaliveReply { ping_id } => self.send_keepalive_reply(ping_id).await,
            AiCommand::InitConversation { .. } => {
                warn!("Ignoring repeated conversation initiation");
                Ok(())
            }
        }
    }

    /// Closes the socket. Only the first call does anything.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            debug!("Closing conversation socket");
            if let Err(err) = sink.send(WsMessage::Close(None)).await {
                debug!(error = %err, "Conversation socket was already gone");
            }
        }
    }

    async fn write(&mut self, cmd: &AiCommand) -> Result<(), BridgeError> {
        let Some(sink) = self.sink.as_mut() else {
            trace!(?cmd, "Conversation socket closed; dropping command");
            return Ok(());
        };
        let frame = conversation::encode_command(cmd);
        let result = sink.send(WsMessage::Text(frame.into())).await;
        if let Err(err) = result {
            self.sink = None;
            return Err(BridgeError::transport(Side::Conversation, err));
        }
        Ok(())
    }
}
