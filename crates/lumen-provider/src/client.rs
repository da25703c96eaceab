//! Generation provider client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lumen_models::{GenerationKind, JobId};

use crate::error::{ProviderError, ProviderResult};
use crate::types::{ProviderJobState, ProviderStatus};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// External generation provider.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Submit a generation request. Returns the provider-assigned job id.
    ///
    /// `callback_target`, when set, is where the provider pushes its
    /// completion callback; polling works either way.
    async fn submit(
        &self,
        kind: GenerationKind,
        input_ref: &str,
        callback_target: Option<&str>,
    ) -> ProviderResult<JobId>;

    /// Query current status for a previously submitted job.
    async fn poll(&self, job_id: &JobId) -> ProviderResult<ProviderStatus>;
}

/// HTTP provider configuration.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Provider base URL.
    pub base_url: String,
    /// Bearer token, if the deployment requires one.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8900".to_string(),
            api_key: None,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl HttpProviderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GENERATION_PROVIDER_URL")
                .unwrap_or_else(|_| "http://localhost:8900".to_string()),
            api_key: std::env::var("GENERATION_PROVIDER_API_KEY").ok(),
            request_timeout: Duration::from_secs(
                std::env::var("GENERATION_PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    kind: &'a str,
    input_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: ProviderJobState,
    #[serde(default)]
    output_ref: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the generation provider's REST API.
#[derive(Clone)]
pub struct HttpGenerationClient {
    http: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpGenerationClient {
    /// Create a new client.
    pub fn new(config: HttpProviderConfig) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(HttpProviderConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationClient {
    async fn submit(
        &self,
        kind: GenerationKind,
        input_ref: &str,
        callback_target: Option<&str>,
    ) -> ProviderResult<JobId> {
        let body = SubmitRequest {
            kind: kind.as_str(),
            input_ref,
            callback_url: callback_target,
        };

        debug!(kind = %kind, "Submitting generation request");
        let response = self
            .authorize(self.http.post(self.url("/v1/generations")))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
                let accepted: SubmitResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::unexpected(format!("submit response: {e}")))?;
                info!(job_id = %accepted.job_id, kind = %kind, "Provider accepted submission");
                Ok(JobId::from_string(accepted.job_id))
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let detail = response.text().await.unwrap_or_default();
                warn!(kind = %kind, "Provider rejected content");
                Err(ProviderError::ContentRejected(detail))
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(ProviderError::submission(format!("HTTP {status}: {detail}")))
            }
        }
    }

    async fn poll(&self, job_id: &JobId) -> ProviderResult<ProviderStatus> {
        let response = self
            .authorize(
                self.http
                    .get(self.url(&format!("/v1/generations/{}", job_id))),
            )
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let status: StatusResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::unexpected(format!("poll response: {e}")))?;
                Ok(ProviderStatus {
                    state: status.status,
                    output_ref: status.output_ref,
                    error: status.error,
                })
            }
            StatusCode::NOT_FOUND => Err(ProviderError::NotFound(job_id.to_string())),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(ProviderError::unexpected(format!("HTTP {status}: {detail}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> HttpGenerationClient {
        HttpGenerationClient::new(HttpProviderConfig {
            base_url: server.uri(),
            api_key: None,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_returns_provider_job_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generations"))
            .and(body_partial_json(serde_json::json!({ "kind": "video" })))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(serde_json::json!({ "job_id": "gen-42" })),
            )
            .mount(&server)
            .await;

        let client = client(&server).await;
        let job_id = client
            .submit(GenerationKind::Video, "media://in/1", None)
            .await
            .unwrap();
        assert_eq!(job_id.as_str(), "gen-42");
    }

    #[tokio::test]
    async fn test_submit_maps_content_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generations"))
            .respond_with(ResponseTemplate::new(422).set_body_string("policy violation"))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let err = client
            .submit(GenerationKind::Photo, "media://in/1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ContentRejected(_)));
    }

    #[tokio::test]
    async fn test_poll_parses_succeeded_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/generations/gen-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "succeeded",
                "output_ref": "media://out/42"
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let status = client.poll(&JobId::from_string("gen-42")).await.unwrap();
        assert_eq!(status.state, ProviderJobState::Succeeded);
        assert_eq!(status.output_ref.as_deref(), Some("media://out/42"));
    }

    #[tokio::test]
    async fn test_poll_unknown_job_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/generations/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let err = client.poll(&JobId::from_string("missing")).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
