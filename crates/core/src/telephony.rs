//! Wire format of the telephony media stream.
//!
//! Inbound frames are JSON objects tagged by `event`; outbound commands use
//! the same envelope and address the stream by its `streamSid`.

use crate::error::DecodeError;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Events received from the telephony side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyEvent {
    /// The socket is up; no stream identifiers yet.
    Connected,
    /// The media stream has started.
    Start {
        stream_id: String,
        call_id: String,
        custom_parameters: BTreeMap<String, String>,
    },
    /// One frame of caller audio (base64, 8kHz mono mu-law). Opaque.
    Media { payload: String },
    /// The call has ended.
    Stop,
    /// An event tag this bridge does not handle (`mark`, `dtmf`, ...).
    Unrecognized,
}

/// Commands sent back to the telephony side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyCommand {
    /// Queue audio for playback to the caller.
    PlayAudio { stream_id: String, payload: String },
    /// Drop any audio queued but not yet played.
    ClearBuffer { stream_id: String },
}

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum InboundFrame {
    Connected,
    Start {
        start: StartPayload,
    },
    Media {
        media: MediaPayload,
    },
    Stop,
    #[serde(other)]
    Unrecognized,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayload {
    stream_sid: String,
    call_sid: String,
    #[serde(default)]
    custom_parameters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct MediaPayload {
    payload: String,
}

/// Decodes one inbound telephony frame.
pub fn decode_event(raw: &str) -> Result<TelephonyEvent, DecodeError> {
    let frame: InboundFrame =
        serde_json::from_str(raw).map_err(|e| DecodeError::new(e.to_string(), raw))?;

    Ok(match frame {
        InboundFrame::Connected => TelephonyEvent::Connected,
        InboundFrame::Start { start } => TelephonyEvent::Start {
            stream_id: start.stream_sid,
            call_id: start.call_sid,
            custom_parameters: start.custom_parameters,
        },
        InboundFrame::Media { media } => TelephonyEvent::Media {
            payload: media.payload,
        },
        InboundFrame::Stop => TelephonyEvent::Stop,
        InboundFrame::Unrecognized => TelephonyEvent::Unrecognized,
    })
}

/// Encodes one outbound telephony command.
pub fn encode_command(cmd: &TelephonyCommand) -> String {
    match cmd {
        TelephonyCommand::PlayAudio { stream_id, payload } => json!({
            "event": "media",
            "streamSid": stream_id,
            "media": { "payload": payload },
        }),
        TelephonyCommand::ClearBuffer { stream_id } => json!({
            "event": "clear",
            "streamSid": stream_id,
        }),
    }
    .to_string()
}
