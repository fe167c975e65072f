//! Session coordinator: owns one call from the moment the telephony socket is
//! accepted until both sockets are closed.
//!
//! All inputs for a call (telephony frames, AI frames, handshake outcome,
//! write failures) are funnelled into a single loop and applied to the
//! call's `CallSession` one at a time. The loop then performs the returned
//! actions in order, so relayed audio keeps its arrival order in both
//! directions.

use super::{
    EventStream,
    conversation::{self, AiSink, ConversationAdapter, ConversationLink},
    telephony::{self, TelephonyAdapter},
};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use callbridge_core::{
    error::{BridgeError, Side},
    session::{Action, CallSession, SessionId, SessionInput},
    telephony::TelephonyCommand,
};
use futures_util::{FutureExt, Sink, StreamExt, future::BoxFuture};
use std::{collections::VecDeque, fmt::Display, sync::Arc};
use tracing::{Span, debug, error, info, instrument, warn};

type Handshake = BoxFuture<'static, Result<ConversationLink, BridgeError>>;

/// Axum handler that upgrades `/media-stream` requests to a WebSocket and
/// bridges the call.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    run_call(sink, telephony::events(stream), state).await;
}

/// Drives one call to completion. Returns once the session is `CLOSED` and it
/// has been removed from the registry.
#[instrument(
    name = "call",
    skip_all,
    fields(session_id, stream_sid, call_sid, conversation_id)
)]
pub async fn run_call<S>(
    telephony_sink: S,
    mut telephony_events: EventStream,
    state: Arc<AppState>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut call = CallSession::new(SessionId::new());
    let span = Span::current();
    span.record("session_id", call.session_id().to_string().as_str());
    state.registry.insert(&call);
    info!("Telephony socket accepted. Awaiting stream start...");

    let mut caller = TelephonyAdapter::new(telephony_sink);
    let mut agent: Option<ConversationAdapter<AiSink>> = None;
    let mut agent_events: Option<EventStream> = None;
    let mut handshake: Option<Handshake> = None;
    let mut pending: VecDeque<SessionInput> = VecDeque::new();

    while !call.is_closed() {
        let input = match pending.pop_front() {
            Some(input) => input,
            None => tokio::select! {
                Some(input) = telephony_events.next() => input,
                Some(input) = next_agent_event(&mut agent_events) => input,
                result = finish_handshake(&mut handshake), if handshake.is_some() => {
                    handshake = None;
                    match result {
                        Ok(link) => {
                            agent = Some(link.adapter);
                            agent_events = Some(link.events);
                            SessionInput::AiConnected
                        }
                        Err(err) => {
                            error!(error = %err, "Conversation handshake failed");
                            SessionInput::AiUnavailable { reason: unavailable_reason(err) }
                        }
                    }
                }
                else => {
                    error!(state = ?call.state(), "Every channel ended before the session closed");
                    call.abandon(BridgeError::transport(
                        Side::Telephony,
                        "event sources ended before teardown completed",
                    ));
                    break;
                }
            },
        };

        for action in call.handle(input) {
            match action {
                Action::ConnectAi { stream_id, call_id } => {
                    span.record("stream_sid", stream_id.as_str());
                    span.record("call_sid", call_id.as_str());
                    info!("Connecting to conversation backend...");
                    handshake = Some(
                        conversation::connect(
                            state.endpoints.clone(),
                            state.config.conversation_overrides(),
                            state.config.ai_connect_timeout,
                        )
                        .boxed(),
                    );
                }
                Action::SendTelephony(cmd) => {
                    let result = match cmd {
                        TelephonyCommand::PlayAudio { stream_id, payload } => {
                            caller.send_audio(stream_id, payload).await
                        }
                        TelephonyCommand::ClearBuffer { stream_id } => {
                            caller.send_clear(stream_id).await
                        }
                    };
                    if let Err(err) = result {
                        warn!(error = %err, "Write to telephony socket failed");
                        pending.push_back(SessionInput::TelephonyClosed {
                            error: Some(transport_detail(err)),
                        });
                    }
                }
                Action::SendAi(cmd) => {
                    let Some(adapter) = agent.as_mut() else {
                        debug!(?cmd, "No conversation socket; dropping command");
                        continue;
                    };
                    if let Err(err) = adapter.send(cmd).await {
                        warn!(error = %err, "Write to conversation socket failed");
                        pending.push_back(SessionInput::AiClosed {
                            error: Some(transport_detail(err)),
                        });
                    }
                }
                Action::CloseTelephony => {
                    caller.close().await;
                    pending.push_back(SessionInput::TelephonyClosed { error: None });
                }
                Action::CloseAi => {
                    if let Some(mut adapter) = agent.take() {
                        adapter.close().await;
                    }
                    agent_events = None;
                    pending.push_back(SessionInput::AiClosed { error: None });
                }
            }
        }

        if let Some(conversation_id) = call.conversation_id() {
            span.record("conversation_id", conversation_id);
        }
        state.registry.publish(&call);
    }

    if let Some(mut adapter) = agent.take() {
        adapter.close().await;
    }
    caller.close().await;

    state.registry.remove(&call.session_id());
    match call.cause() {
        Some(cause) => info!(%cause, "Call finished"),
        None => error!(state = ?call.state(), "Call finished without a recorded cause"),
    }
}

async fn next_agent_event(events: &mut Option<EventStream>) -> Option<SessionInput> {
    match events {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

async fn finish_handshake(
    handshake: &mut Option<Handshake>,
) -> Result<ConversationLink, BridgeError> {
    match handshake {
        Some(handshake) => handshake.await,
        None => std::future::pending().await,
    }
}

fn unavailable_reason(err: BridgeError) -> String {
    match err {
        BridgeError::AiUnavailable(reason) => reason,
        other => other.to_string(),
    }
}

fn transport_detail(err: BridgeError) -> String {
    match err {
        BridgeError::Transport { detail, .. } => detail,
        other => other.to_string(),
    }
}
