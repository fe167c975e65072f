use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use callbridge_api::{
    bridge::SessionRegistry, config::Config, router::create_router, state::AppState,
};
use callbridge_core::{
    endpoint::{EndpointError, EndpointProvider},
    session::{CallSession, SessionId},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceExt;
use tracing::Level;

struct Unused;

#[async_trait]
impl EndpointProvider for Unused {
    async fn signed_url(&self) -> Result<String, EndpointError> {
        panic!("plain HTTP routes must not acquire conversation endpoints")
    }
}

fn app_state() -> Arc<AppState> {
    let config = Config {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        elevenlabs_api_key: None,
        elevenlabs_agent_id: None,
        elevenlabs_api_base: "https://api.elevenlabs.io".into(),
        ai_connect_timeout: Duration::from_secs(10),
        agent_first_message: None,
        agent_language: None,
        log_level: Level::INFO,
    };
    Arc::new(AppState {
        config: Arc::new(config),
        registry: Arc::new(SessionRegistry::new()),
        endpoints: Arc::new(Unused),
    })
}

async fn body_string(body: Body) -> String {
    let bytes = to_bytes(body, 64 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_incoming_call_returns_stream_twiml() {
    for method in ["POST", "GET"] {
        let response = create_router(app_state())
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/incoming-call")
                    .header(header::HOST, "bridge.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/xml");
        let twiml = body_string(response.into_body()).await;
        assert!(twiml.contains(
            r#"<Response><Connect><Stream url="wss://bridge.example.com/media-stream"/></Connect></Response>"#
        ));
    }
}

#[tokio::test]
async fn test_incoming_call_without_host_is_rejected() {
    let response = create_router(app_state())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/incoming-call")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_live_sessions() {
    let state = app_state();
    state.registry.insert(&CallSession::new(SessionId::new()));

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_str(&body_string(response.into_body()).await).unwrap();
    assert_eq!(body, serde_json::json!({"status": "ok", "active_sessions": 1}));
}

#[tokio::test]
async fn test_sessions_lists_live_snapshots() {
    let state = app_state();
    let call = CallSession::new(SessionId::new());
    state.registry.insert(&call);

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri("/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_str(&body_string(response.into_body()).await).unwrap();
    let sessions = body.as_array().expect("array of sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], call.session_id().to_string());
    assert_eq!(sessions[0]["state"], "AWAITING_START");
    assert_eq!(sessions[0]["frames_to_ai"], 0);
}

#[tokio::test]
async fn test_media_stream_requires_websocket_upgrade() {
    let response = create_router(app_state())
        .oneshot(
            Request::builder()
                .uri("/media-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
