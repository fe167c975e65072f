//! Telephony Channel Adapter: the server side of the media-stream socket.

use super::EventStream;
use axum::extract::ws::Message;
use callbridge_core::{
    error::{BridgeError, Side},
    session::SessionInput,
    telephony::{self, TelephonyCommand},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt, stream};
use std::fmt::Display;
use tracing::{debug, trace, warn};

/// Turns the read half of the telephony socket into a finite stream of
/// session inputs. Malformed frames are logged and skipped; the stream always
/// ends with exactly one `TelephonyClosed`.
pub fn events<St, E>(socket: St) -> EventStream
where
    St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send,
{
    stream::unfold(Some(socket), |socket| async move {
        let mut socket = socket?;
        loop {
            let closed = match socket.next().await {
                Some(Ok(Message::Text(text))) => match telephony::decode_event(text.as_str()) {
                    Ok(event) => return Some((SessionInput::Telephony(event), Some(socket))),
                    Err(err) => {
                        warn!(error = %err, raw = %err.raw, "Discarding malformed telephony frame");
                        continue;
                    }
                },
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = data.len(), "Ignoring binary telephony frame");
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Telephony peer sent close frame");
                    SessionInput::TelephonyClosed { error: None }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(err)) => SessionInput::TelephonyClosed {
                    error: Some(err.to_string()),
                },
                None => SessionInput::TelephonyClosed { error: None },
            };
            return Some((closed, None));
        }
    })
    .fuse()
    .boxed()
}

/// Write half of the telephony socket.
///
/// Every operation is a no-op once the socket has been closed or a write has
/// failed, so late commands racing a teardown are harmless.
pub struct TelephonyAdapter<S> {
    sink: Option<S>,
}

impl<S> TelephonyAdapter<S>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    pub fn new(sink: S) -> Self {
        Self { sink: Some(sink) }
    }

    /// Queues agent audio for playback on the caller's device.
    pub async fn send_audio(
        &mut self,
        stream_id: String,
        payload: String,
    ) -> Result<(), BridgeError> {
        self.write(&TelephonyCommand::PlayAudio { stream_id, payload })
            .await
    }

    /// Flushes audio queued for playback but not yet played.
    pub async fn send_clear(&mut self, stream_id: String) -> Result<(), BridgeError> {
        self.write(&TelephonyCommand::ClearBuffer { stream_id }).await
    }

    /// Closes the socket. Only the first call does anything.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            debug!("Closing telephony socket");
            if let Err(err) = sink.send(Message::Close(None)).await {
                debug!(error = %err, "Telephony socket was already gone");
            }
        }
    }

    async fn write(&mut self, cmd: &TelephonyCommand) -> Result<(), BridgeError> {
        let Some(sink) = self.sink.as_mut() else {
            trace!(?cmd, "Telephony socket closed; dropping command");
            return Ok(());
        };
        let frame = telephony::encode_command(cmd);
        let result = sink.send(Message::Text(frame.into())).await;
        if let Err(err) = result {
            self.sink = None;
            return Err(BridgeError::transport(Side::Telephony, err));
        }
        Ok(())
    }
}
