use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Failures while acquiring an authorized conversation endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
    #[error("endpoint request timed out")]
    Timeout,
    #[error("endpoint request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("endpoint request rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed endpoint response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for EndpointError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EndpointError::Timeout
        } else {
            EndpointError::Http(err)
        }
    }
}

/// Hands out short-lived, pre-authorized WebSocket URLs for new conversations.
#[async_trait]
pub trait EndpointProvider: Send + Sync {
    /// Returns a URL the caller may open without further credentials.
    async fn signed_url(&self) -> Result<String, EndpointError>;
}

/// Credentials and location of the conversational AI backend.
#[derive(Clone, Debug)]
pub struct ElevenLabsSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

/// An `EndpointProvider` backed by the ElevenLabs signed-URL API.
pub struct ElevenLabsEndpoints {
    client: reqwest::Client,
    settings: ElevenLabsSettings,
}

impl ElevenLabsEndpoints {
    /// Creates a provider whose every request is bounded by `settings.timeout`.
    pub fn new(settings: ElevenLabsSettings) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl EndpointProvider for ElevenLabsEndpoints {
    async fn signed_url(&self) -> Result<String, EndpointError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or(EndpointError::MissingCredentials("ELEVENLABS_API_KEY"))?;
        let agent_id = self
            .settings
            .agent_id
            .as_deref()
            .ok_or(EndpointError::MissingCredentials("ELEVENLABS_AGENT_ID"))?;

        let url = format!(
            "{}/v1/convai/conversation/get_signed_url",
            self.settings.api_base.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .query(&[("agent_id", agent_id)])
            .header("xi-api-key", api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| EndpointError::MalformedResponse(e.to_string()))?;
        tracing::debug!("Acquired signed conversation URL");
        Ok(body.signed_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> ElevenLabsSettings {
        ElevenLabsSettings {
            api_base: server.uri(),
            api_key: Some("test-key".to_string()),
            agent_id: Some("agent_123".to_string()),
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_signed_url_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/convai/conversation/get_signed_url"))
            .and(query_param("agent_id", "agent_123"))
            .and(header("xi-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signed_url": "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=agent_123&token=t"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoints = ElevenLabsEndpoints::new(settings(&server)).unwrap();
        let url = endpoints.signed_url().await.unwrap();
        assert!(url.starts_with("wss://"));
        assert!(url.contains("token=t"));
    }

    #[tokio::test]
    async fn test_signed_url_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let endpoints = ElevenLabsEndpoints::new(settings(&server)).unwrap();
        match endpoints.signed_url().await {
            Err(EndpointError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signed_url_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"url": 1})))
            .mount(&server)
            .await;

        let endpoints = ElevenLabsEndpoints::new(settings(&server)).unwrap();
        assert!(matches!(
            endpoints.signed_url().await,
            Err(EndpointError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_signed_url_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"signed_url": "wss://late"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut settings = settings(&server);
        settings.timeout = Duration::from_millis(200);
        let endpoints = ElevenLabsEndpoints::new(settings).unwrap();
        assert!(matches!(
            endpoints.signed_url().await,
            Err(EndpointError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_missing_agent_id_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut settings = settings(&server);
        settings.agent_id = None;
        let endpoints = ElevenLabsEndpoints::new(settings).unwrap();
        assert!(matches!(
            endpoints.signed_url().await,
            Err(EndpointError::MissingCredentials("ELEVENLABS_AGENT_ID"))
        ));
    }
}
