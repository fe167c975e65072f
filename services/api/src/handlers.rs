//! Axum Handlers for the plain HTTP routes.

use crate::{bridge::SessionSnapshot, state::AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Answers the telephony provider's incoming-call webhook with TwiML that
/// connects the call's media stream back to this server.
pub async fn incoming_call(headers: HeaderMap) -> Response {
    let Some(host) = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
    else {
        warn!("Incoming call webhook without a usable Host header");
        return (StatusCode::BAD_REQUEST, "missing Host header").into_response();
    };

    info!(%host, "Incoming call; directing media stream to this server");
    (
        [(header::CONTENT_TYPE, "text/xml")],
        connect_twiml(host),
    )
        .into_response()
}

fn connect_twiml(host: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<Response><Connect><Stream url="wss://{}/media-stream"/></Connect></Response>"#
        ),
        escape_xml(host)
    )
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.registry.len(),
    })
}

/// Lists every live call as the coordinator last published it.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<SessionSnapshot>> {
    Json(state.registry.snapshots())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiml_points_at_media_stream() {
        assert_eq!(
            connect_twiml("abc.ngrok.app"),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="wss://abc.ngrok.app/media-stream"/></Connect></Response>"#
        );
    }

    #[test]
    fn test_twiml_escapes_host() {
        let twiml = connect_twiml(r#"evil"/><Hangup/>"#);
        assert!(!twiml.contains("<Hangup/>"));
        assert!(twiml.contains("evil&quot;/&gt;&lt;Hangup/&gt;"));
    }
}
