//! Per-call bridge between the telephony media stream and the conversation
//! backend.
//!
//! - `telephony`: adapter for the phone-network socket.
//! - `conversation`: adapter and handshake for the AI socket.
//! - `session`: the coordinator that owns one call from accept to teardown.
//! - `registry`: process-wide index of live sessions.

pub mod conversation;
pub mod registry;
pub mod session;
pub mod telephony;

use callbridge_core::session::SessionInput;
use futures_util::stream::BoxStream;

/// A socket turned into a finite stream of session inputs.
pub type EventStream = BoxStream<'static, SessionInput>;

pub use registry::{SessionRegistry, SessionSnapshot};
pub use session::media_stream_handler;
