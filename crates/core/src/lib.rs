//! Protocol core of the call bridge.
//!
//! Pure translation between the telephony media-stream protocol and the
//! conversational AI protocol, plus the per-call state machine that decides
//! what to relay and when to tear down. No I/O happens here apart from the
//! endpoint acquisition client in [`endpoint`].

pub mod conversation;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod telephony;

pub use error::{BridgeError, DecodeError, Side};
pub use session::{Action, AudioFrame, CallSession, SessionId, SessionInput, SessionState};
