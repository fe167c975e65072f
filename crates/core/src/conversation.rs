//! Wire format of the conversational AI socket.
//!
//! Inbound events are JSON objects tagged by `type`. Outbound audio is an
//! untagged `{"user_audio_chunk": ..}` object; everything else is tagged.

use crate::error::DecodeError;
use serde_json::{Map, Value, json};

/// Events received from the conversation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiEvent {
    /// Handshake metadata; carries the backend's id for this conversation.
    InitMetadata { conversation_id: String },
    /// One chunk of agent audio (base64, same format as caller audio). Opaque.
    AudioChunk { payload: String },
    AgentUtterance { text: String },
    UserUtterance { text: String },
    /// The caller barged in; queued agent audio must be discarded.
    Interruption,
    /// Liveness probe; must be answered with the same id.
    Keepalive { ping_id: u64 },
    /// Advisory error report from the backend.
    Error { detail: String },
    /// A `type` this bridge does not handle.
    Unrecognized { raw: String },
}

/// Agent settings overridden at conversation start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationOverrides {
    pub first_message: Option<String>,
    pub language: Option<String>,
}

impl ConversationOverrides {
    pub fn is_empty(&self) -> bool {
        self.first_message.is_none() && self.language.is_none()
    }
}

/// Commands sent to the conversation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiCommand {
    InitConversation { overrides: ConversationOverrides },
    UserAudio { payload: String },
    KeepaliveReply { ping_id: u64 },
}

/// Locations of the agent audio payload, most preferred first.
///
/// The backend has shipped more than one shape for the same field; the first
/// path that resolves to a string wins.
const AUDIO_PAYLOAD_PATHS: &[&[&str]] = &[&["audio_event", "audio_base_64"], &["audio", "chunk"]];

const AGENT_RESPONSE_PATH: &[&str] = &["agent_response_event", "agent_response"];
const USER_TRANSCRIPT_PATH: &[&str] = &["user_transcription_event", "user_transcript"];
const PING_ID_PATH: &[&str] = &["ping_event", "event_id"];
const ERROR_DETAIL_PATHS: &[&[&str]] = &[&["message"], &["error", "message"], &["error"]];

fn lookup<'a>(object: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(object.get(*first)?, |value, key| value.get(*key))
}

fn lookup_str<'a>(object: &'a Map<String, Value>, path: &[&str]) -> Option<&'a str> {
    lookup(object, path).and_then(Value::as_str)
}

fn first_str<'a>(object: &'a Map<String, Value>, paths: &[&[&str]]) -> Option<&'a str> {
    paths.iter().find_map(|path| lookup_str(object, path))
}

/// Decodes one inbound conversation frame.
pub fn decode_event(raw: &str) -> Result<AiEvent, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| DecodeError::new(e.to_string(), raw))?;
    let Value::Object(object) = value else {
        return Err(DecodeError::new("frame is not a JSON object", raw));
    };
    let Some(kind) = object.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::new("missing `type` tag", raw));
    };
    let missing = |what: &str| DecodeError::new(format!("`{kind}` event without {what}"), raw);

    let event = match kind {
        "conversation_initiation_metadata" => {
            let conversation_id = lookup_str(
                &object,
                &["conversation_initiation_metadata_event", "conversation_id"],
            )
            .or_else(|| lookup_str(&object, &["conversation_id"]))
            .ok_or_else(|| missing("a conversation id"))?;
            AiEvent::InitMetadata {
                conversation_id: conversation_id.to_owned(),
            }
        }
        "audio" => {
            let payload =
                first_str(&object, AUDIO_PAYLOAD_PATHS).ok_or_else(|| missing("an audio payload"))?;
            AiEvent::AudioChunk {
                payload: payload.to_owned(),
            }
        }
        "agent_response" => AiEvent::AgentUtterance {
            text: lookup_str(&object, AGENT_RESPONSE_PATH)
                .ok_or_else(|| missing("response text"))?
                .to_owned(),
        },
        "user_transcript" => AiEvent::UserUtterance {
            text: lookup_str(&object, USER_TRANSCRIPT_PATH)
                .ok_or_else(|| missing("transcript text"))?
                .to_owned(),
        },
        "interruption" => AiEvent::Interruption,
        "ping" => AiEvent::Keepalive {
            ping_id: lookup(&object, PING_ID_PATH)
                .and_then(Value::as_u64)
                .ok_or_else(|| missing("an event id"))?,
        },
        "error" => AiEvent::Error {
            detail: first_str(&object, ERROR_DETAIL_PATHS)
                .map(str::to_owned)
                .unwrap_or_else(|| raw.to_owned()),
        },
        _ => AiEvent::Unrecognized {
            raw: raw.to_owned(),
        },
    };
    Ok(event)
}

/// Encodes one outbound conversation command.
pub fn encode_command(cmd: &AiCommand) -> String {
    match cmd {
        AiCommand::InitConversation { overrides } => {
            let mut init = json!({ "type": "conversation_initiation_client_data" });
            if !overrides.is_empty() {
                let mut agent = Map::new();
                if let Some(first_message) = &overrides.first_message {
                    agent.insert("first_message".into(), json!(first_message));
                }
                if let Some(language) = &overrides.language {
                    agent.insert("language".into(), json!(language));
                }
                init["conversation_config_override"] = json!({ "agent": agent });
            }
            init
        }
        AiCommand::UserAudio { payload } => json!({ "user_audio_chunk": payload }),
        AiCommand::KeepaliveReply { ping_id } => json!({ "type": "pong", "event_id": ping_id }),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_init_metadata() {
        let nested = r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv_1","agent_output_audio_format":"ulaw_8000"}}"#;
        let flat = r#"{"type":"conversation_initiation_metadata","conversation_id":"conv_2"}"#;
        assert_eq!(
            decode_event(nested).unwrap(),
            AiEvent::InitMetadata {
                conversation_id: "conv_1".into()
            }
        );
        assert_eq!(
            decode_event(flat).unwrap(),
            AiEvent::InitMetadata {
                conversation_id: "conv_2".into()
            }
        );
    }

    #[test]
    fn test_decode_audio_accepts_both_payload_shapes() {
        assert_eq!(
            decode_event(r#"{"type":"audio","audio":{"chunk":"BBB="}}"#).unwrap(),
            AiEvent::AudioChunk {
                payload: "BBB=".into()
            }
        );
        assert_eq!(
            decode_event(r#"{"type":"audio","audio_event":{"audio_base_64":"CCC=","event_id":3}}"#)
                .unwrap(),
            AiEvent::AudioChunk {
                payload: "CCC=".into()
            }
        );
    }

    #[test]
    fn test_decode_audio_prefers_audio_event_when_both_present() {
        let raw = r#"{"type":"audio","audio":{"chunk":"OLD="},"audio_event":{"audio_base_64":"NEW="}}"#;
        assert_eq!(
            decode_event(raw).unwrap(),
            AiEvent::AudioChunk {
                payload: "NEW=".into()
            }
        );
    }

    #[test]
    fn test_decode_audio_without_payload_is_error() {
        let raw = r#"{"type":"audio","audio_event":{"event_id":3}}"#;
        let err = decode_event(raw).unwrap_err();
        assert_eq!(err.raw, raw);
    }

    #[test]
    fn test_decode_utterances() {
        assert_eq!(
            decode_event(r#"{"type":"agent_response","agent_response_event":{"agent_response":"Hello!"}}"#)
                .unwrap(),
            AiEvent::AgentUtterance {
                text: "Hello!".into()
            }
        );
        assert_eq!(
            decode_event(r#"{"type":"user_transcript","user_transcription_event":{"user_transcript":"hi"}}"#)
                .unwrap(),
            AiEvent::UserUtterance { text: "hi".into() }
        );
    }

    #[test]
    fn test_decode_control_events() {
        assert_eq!(
            decode_event(r#"{"type":"interruption","interruption_event":{"event_id":7}}"#).unwrap(),
            AiEvent::Interruption
        );
        assert_eq!(
            decode_event(r#"{"type":"ping","ping_event":{"event_id":42,"ping_ms":null}}"#).unwrap(),
            AiEvent::Keepalive { ping_id: 42 }
        );
        assert_eq!(
            decode_event(r#"{"type":"error","message":"quota exceeded"}"#).unwrap(),
            AiEvent::Error {
                detail: "quota exceeded".into()
            }
        );
    }

    #[test]
    fn test_decode_error_without_message_keeps_raw() {
        let raw = r#"{"type":"error","code":1011}"#;
        assert_eq!(
            decode_event(raw).unwrap(),
            AiEvent::Error { detail: raw.into() }
        );
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let raw = r#"{"type":"vad_score","vad_score_event":{"vad_score":0.9}}"#;
        assert_eq!(
            decode_event(raw).unwrap(),
            AiEvent::Unrecognized { raw: raw.into() }
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(decode_event("[1,2,3]").is_err());
        assert!(decode_event(r#"{"audio":{"chunk":"A="}}"#).is_err());
        assert!(decode_event(r#"{"type":"ping","ping_event":{}}"#).is_err());
        assert!(decode_event("{").is_err());
    }

    #[test]
    fn test_encode_commands() {
        let audio: Value =
            serde_json::from_str(&encode_command(&AiCommand::UserAudio { payload: "AAA=".into() }))
                .unwrap();
        assert_eq!(audio, json!({"user_audio_chunk": "AAA="}));

        let pong: Value =
            serde_json::from_str(&encode_command(&AiCommand::KeepaliveReply { ping_id: 42 }))
                .unwrap();
        assert_eq!(pong, json!({"type": "pong", "event_id": 42}));
    }

    #[test]
    fn test_encode_init_conversation() {
        let bare: Value = serde_json::from_str(&encode_command(&AiCommand::InitConversation {
            overrides: ConversationOverrides::default(),
        }))
        .unwrap();
        assert_eq!(bare, json!({"type": "conversation_initiation_client_data"}));

        let with_overrides: Value =
            serde_json::from_str(&encode_command(&AiCommand::InitConversation {
                overrides: ConversationOverrides {
                    first_message: Some("Thanks for calling.".into()),
                    language: None,
                },
            }))
            .unwrap();
        assert_eq!(
            with_overrides,
            json!({
                "type": "conversation_initiation_client_data",
                "conversation_config_override": {"agent": {"first_message": "Thanks for calling."}}
            })
        );
    }
}
