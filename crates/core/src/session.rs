//! Per-call session record and the bridge state machine.
//!
//! `CallSession::handle` is pure: it consumes one input from either socket and
//! returns the actions the runtime must perform, in order. The runtime feeds
//! every socket event through one `CallSession`, so all state transitions for
//! a call are serialized by construction.

use crate::{
    conversation::{AiCommand, AiEvent},
    error::{BridgeError, Side},
    telephony::{TelephonyCommand, TelephonyEvent},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Opaque per-connection identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    AwaitingStart,
    ConnectingAi,
    Active,
    Closing,
    Closed,
}

/// Direction of an audio frame through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    CallerToAi,
    AiToCaller,
}

/// One unit of relayed audio. The payload is opaque base-64 and is passed
/// through unmodified; frames are never buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub session_id: SessionId,
    pub direction: Direction,
    pub payload: String,
}

impl AudioFrame {
    /// The command that carries this frame to the opposite socket. Agent
    /// audio is addressed by telephony stream id and yields nothing without
    /// one.
    pub fn into_action(self, stream_id: Option<&str>) -> Option<Action> {
        match self.direction {
            Direction::CallerToAi => Some(Action::SendAi(AiCommand::UserAudio {
                payload: self.payload,
            })),
            Direction::AiToCaller => stream_id.map(|stream_id| {
                Action::SendTelephony(TelephonyCommand::PlayAudio {
                    stream_id: stream_id.to_owned(),
                    payload: self.payload,
                })
            }),
        }
    }
}

/// Why a session left `ACTIVE` (or never reached it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    /// The telephony side sent `stop`.
    CallEnded,
    /// A socket closed without an error.
    PeerClosed(Side),
    Failed(BridgeError),
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::CallEnded => write!(f, "call ended"),
            TerminationCause::PeerClosed(side) => write!(f, "{side} socket closed"),
            TerminationCause::Failed(err) => write!(f, "{err}"),
        }
    }
}

/// Everything the runtime can report to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Telephony(TelephonyEvent),
    /// The telephony socket is gone. `error` is set when it failed rather
    /// than closed.
    TelephonyClosed { error: Option<String> },
    /// The AI socket is open and `InitConversation` has been sent.
    AiConnected,
    /// The AI handshake failed.
    AiUnavailable { reason: String },
    Ai(AiEvent),
    AiClosed { error: Option<String> },
}

/// Work the runtime must carry out on behalf of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start the AI handshake. Its outcome comes back as `AiConnected` or
    /// `AiUnavailable`.
    ConnectAi { stream_id: String, call_id: String },
    SendTelephony(TelephonyCommand),
    SendAi(AiCommand),
    CloseTelephony,
    CloseAi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelephonyLink {
    Open,
    CloseRequested,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AiLink {
    NotStarted,
    Connecting,
    Open,
    CloseRequested,
    Closed,
}

/// One call bridged between the telephony stream and the AI conversation.
#[derive(Debug, Clone)]
pub struct CallSession {
    session_id: SessionId,
    state: SessionState,
    stream_id: Option<String>,
    call_id: Option<String>,
    custom_parameters: BTreeMap<String, String>,
    conversation_id: Option<String>,
    cause: Option<TerminationCause>,
    started_at: DateTime<Utc>,
    frames_to_ai: u64,
    frames_to_caller: u64,
    telephony: TelephonyLink,
    ai: AiLink,
}

impl CallSession {
    /// Creates the record for a freshly accepted telephony socket.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: SessionState::AwaitingStart,
            stream_id: None,
            call_id: None,
            custom_parameters: BTreeMap::new(),
            conversation_id: None,
            cause: None,
            started_at: Utc::now(),
            frames_to_ai: 0,
            frames_to_caller: 0,
            telephony: TelephonyLink::Open,
            ai: AiLink::NotStarted,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn custom_parameters(&self) -> &BTreeMap<String, String> {
        &self.custom_parameters
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// The first terminating condition observed, if any.
    pub fn cause(&self) -> Option<&TerminationCause> {
        self.cause.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Number of audio frames relayed in the given direction so far.
    pub fn frames_relayed(&self, direction: Direction) -> u64 {
        match direction {
            Direction::CallerToAi => self.frames_to_ai,
            Direction::AiToCaller => self.frames_to_caller,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Forces `CLOSED` when every event source has ended without the
    /// teardown completing. An earlier cause is kept.
    pub fn abandon(&mut self, err: BridgeError) {
        if self.state == SessionState::Closed {
            return;
        }
        warn!(error = %err, from = ?self.state, "Abandoning session");
        if self.cause.is_none() {
            self.cause = Some(TerminationCause::Failed(err));
        }
        self.telephony = TelephonyLink::Closed;
        self.ai = AiLink::Closed;
        self.state = SessionState::Closed;
    }

    /// Applies one input and returns the actions it triggers, in the order
    /// they must be performed.
    pub fn handle(&mut self, input: SessionInput) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == SessionState::Closed {
            trace!(?input, "Discarding input for closed session");
            return actions;
        }

        match input {
            SessionInput::Telephony(event) => self.on_telephony(event, &mut actions),
            SessionInput::TelephonyClosed { error } => {
                self.telephony = TelephonyLink::Closed;
                let cause = match error {
                    Some(detail) => {
                        TerminationCause::Failed(BridgeError::transport(Side::Telephony, detail))
                    }
                    None => TerminationCause::PeerClosed(Side::Telephony),
                };
                self.begin_teardown(cause, &mut actions);
            }
            SessionInput::AiConnected => self.on_ai_connected(&mut actions),
            SessionInput::AiUnavailable { reason } => {
                if self.ai == AiLink::Connecting {
                    self.ai = AiLink::Closed;
                }
                self.begin_teardown(
                    TerminationCause::Failed(BridgeError::AiUnavailable(reason)),
                    &mut actions,
                );
            }
            SessionInput::Ai(event) => self.on_ai(event, &mut actions),
            SessionInput::AiClosed { error } => {
                self.ai = AiLink::Closed;
                let cause = match error {
                    Some(detail) => {
                        TerminationCause::Failed(BridgeError::transport(Side::Conversation, detail))
                    }
                    None => TerminationCause::PeerClosed(Side::Conversation),
                };
                self.begin_teardown(cause, &mut actions);
            }
        }

        self.settle();
        actions
    }

    fn on_telephony(&mut self, event: TelephonyEvent, actions: &mut Vec<Action>) {
        if self.state == SessionState::Closing {
            trace!(?event, "Ignoring telephony event during teardown");
            return;
        }

        match event {
            TelephonyEvent::Connected => debug!("Telephony stream connected"),
            TelephonyEvent::Start {
                stream_id,
                call_id,
                custom_parameters,
            } => {
                if self.state != SessionState::AwaitingStart {
                    let violation = BridgeError::ProtocolViolation(format!(
                        "second start event (stream {stream_id}) on an already started stream"
                    ));
                    self.begin_teardown(TerminationCause::Failed(violation), actions);
                    return;
                }
                info!(%stream_id, %call_id, "Telephony stream started");
                self.stream_id = Some(stream_id.clone());
                self.call_id = Some(call_id.clone());
                self.custom_parameters = custom_parameters;
                self.state = SessionState::ConnectingAi;
                self.ai = AiLink::Connecting;
                actions.push(Action::ConnectAi { stream_id, call_id });
            }
            TelephonyEvent::Media { payload } => {
                if self.state == SessionState::Active {
                    self.relay(Direction::CallerToAi, payload, actions);
                } else {
                    warn!(state = ?self.state, "Dropping caller audio received before the bridge is active");
                }
            }
            TelephonyEvent::Stop => {
                info!("Telephony stream stopped");
                self.begin_teardown(TerminationCause::CallEnded, actions);
            }
            TelephonyEvent::Unrecognized => debug!("Ignoring unrecognized telephony event"),
        }
    }

    fn on_ai_connected(&mut self, actions: &mut Vec<Action>) {
        if self.ai != AiLink::Connecting {
            warn!(ai = ?self.ai, "Unexpected AI connection report");
            return;
        }
        if self.state == SessionState::ConnectingAi {
            info!("Conversation connected; bridge is active");
            self.ai = AiLink::Open;
            self.state = SessionState::Active;
        } else {
            // The call ended while the handshake was in flight.
            debug!("Conversation connected after teardown began; closing it");
            self.ai = AiLink::CloseRequested;
            actions.push(Action::CloseAi);
        }
    }

    fn on_ai(&mut self, event: AiEvent, actions: &mut Vec<Action>) {
        if !matches!(
            self.state,
            SessionState::ConnectingAi | SessionState::Active
        ) {
            trace!(?event, "Ignoring AI event outside of an active bridge");
            return;
        }

        match event {
            AiEvent::InitMetadata { conversation_id } => {
                info!(%conversation_id, "Conversation initiated");
                self.conversation_id = Some(conversation_id);
            }
            AiEvent::AudioChunk { payload } => self.relay(Direction::AiToCaller, payload, actions),
            AiEvent::Interruption => match &self.stream_id {
                Some(stream_id) => {
                    debug!("Caller interrupted; clearing queued playback");
                    actions.push(Action::SendTelephony(TelephonyCommand::ClearBuffer {
                        stream_id: stream_id.clone(),
                    }));
                }
                None => warn!("Interruption received before telephony stream id is known"),
            },
            AiEvent::Keepalive { ping_id } => {
                actions.push(Action::SendAi(AiCommand::KeepaliveReply { ping_id }));
            }
            AiEvent::AgentUtterance { text } => info!(%text, "Agent"),
            AiEvent::UserUtterance { text } => info!(%text, "Caller"),
            AiEvent::Error { detail } => warn!(%detail, "Conversation backend reported an error"),
            AiEvent::Unrecognized { raw } => debug!(%raw, "Ignoring unrecognized AI event"),
        }
    }

    fn relay(&mut self, direction: Direction, payload: String, actions: &mut Vec<Action>) {
        let frame = AudioFrame {
            session_id: self.session_id,
            direction,
            payload,
        };
        trace!(?direction, bytes = frame.payload.len(), "Relaying audio");
        match frame.into_action(self.stream_id.as_deref()) {
            Some(action) => {
                match direction {
                    Direction::CallerToAi => self.frames_to_ai += 1,
                    Direction::AiToCaller => self.frames_to_caller += 1,
                }
                actions.push(action);
            }
            None => warn!("Dropping agent audio: no telephony stream id yet"),
        }
    }

    /// Enters `CLOSING` (recording the first cause) and asks each socket that
    /// is still open to close. Safe to call any number of times.
    fn begin_teardown(&mut self, cause: TerminationCause, actions: &mut Vec<Action>) {
        match &self.cause {
            None => {
                info!(%cause, from = ?self.state, "Session closing");
                self.cause = Some(cause);
            }
            Some(first) => debug!(%cause, %first, "Additional terminal event during teardown"),
        }
        self.state = SessionState::Closing;

        if self.ai == AiLink::Open {
            self.ai = AiLink::CloseRequested;
            actions.push(Action::CloseAi);
        }
        if self.telephony == TelephonyLink::Open {
            self.telephony = TelephonyLink::CloseRequested;
            actions.push(Action::CloseTelephony);
        }
    }

    /// Moves `CLOSING` to `CLOSED` once neither socket can still be open.
    fn settle(&mut self) {
        let telephony_done = self.telephony == TelephonyLink::Closed;
        let ai_done = matches!(self.ai, AiLink::NotStarted | AiLink::Closed);
        if self.state == SessionState::Closing && telephony_done && ai_done {
            info!(
                frames_to_ai = self.frames_to_ai,
                frames_to_caller = self.frames_to_caller,
                "Session closed"
            );
            self.state = SessionState::Closed;
        }
    }
}
