//! Error taxonomy shared by the codec, the session state machine and the
//! runtime adapters.
//!
//! Every error here is scoped to a single call. None of them is ever allowed
//! to escape a session and take the process down.

use std::fmt;

/// A frame that could not be decoded into a known event shape.
///
/// Never fatal: the caller logs it and discards the frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed frame: {reason}")]
pub struct DecodeError {
    pub reason: String,
    /// The offending frame, verbatim.
    pub raw: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

/// Which of the two sockets a transport failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Telephony,
    Conversation,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Telephony => write!(f, "telephony"),
            Side::Conversation => write!(f, "conversation"),
        }
    }
}

/// Failures that end a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The telephony side broke its own protocol (e.g. a second `start`).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The AI endpoint could not be acquired or its socket could not be opened.
    #[error("conversation backend unavailable: {0}")]
    AiUnavailable(String),
    /// A socket errored mid-call.
    #[error("{side} transport error: {detail}")]
    Transport { side: Side, detail: String },
}

impl BridgeError {
    pub fn transport(side: Side, detail: impl fmt::Display) -> Self {
        BridgeError::Transport {
            side,
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::transport(Side::Conversation, "connection reset");
        assert_eq!(
            err.to_string(),
            "conversation transport error: connection reset"
        );
        assert_eq!(
            BridgeError::ProtocolViolation("duplicate start".into()).to_string(),
            "protocol violation: duplicate start"
        );
    }

    #[test]
    fn test_decode_error_keeps_raw_frame() {
        let err = DecodeError::new("expected value", "{not json");
        assert_eq!(err.raw, "{not json");
        assert_eq!(err.to_string(), "malformed frame: expected value");
    }
}
