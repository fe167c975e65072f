//! Process-wide registry of live call sessions.
//!
//! Entries are inserted when a telephony socket is accepted and removed when
//! that session has fully torn down. Each session only ever touches its own
//! key, so concurrent accepts and teardowns from different calls never
//! contend on the same entry.

use callbridge_core::session::{CallSession, Direction, SessionId, SessionState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// A read-only view of one session, published by its coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    pub conversation_id: Option<String>,
    pub custom_parameters: BTreeMap<String, String>,
    pub frames_to_ai: u64,
    pub frames_to_caller: u64,
    pub started_at: DateTime<Utc>,
}

impl From<&CallSession> for SessionSnapshot {
    fn from(session: &CallSession) -> Self {
        Self {
            session_id: session.session_id(),
            state: session.state(),
            stream_sid: session.stream_id().map(str::to_owned),
            call_sid: session.call_id().map(str::to_owned),
            conversation_id: session.conversation_id().map(str::to_owned),
            custom_parameters: session.custom_parameters().clone(),
            frames_to_ai: session.frames_relayed(Direction::CallerToAi),
            frames_to_caller: session.frames_relayed(Direction::AiToCaller),
            started_at: session.started_at(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionSnapshot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted session.
    pub fn insert(&self, session: &CallSession) {
        self.sessions
            .insert(session.session_id(), SessionSnapshot::from(session));
    }

    /// Refreshes the snapshot of a registered session. Sessions that were
    /// already removed stay removed.
    pub fn publish(&self, session: &CallSession) {
        if let Some(mut entry) = self.sessions.get_mut(&session.session_id()) {
            *entry = SessionSnapshot::from(session);
        }
    }

    /// Removes a fully torn down session. Returns its last snapshot.
    pub fn remove(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        self.sessions.remove(session_id).map(|(_, snapshot)| snapshot)
    }

    /// Copies out every live session, in no particular order.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
