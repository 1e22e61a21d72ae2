// Replicate predictions API client.
// A prediction is created once and then polled until it reaches a terminal
// status. Requests are never re-sent.

use super::{ImageEditor, InferenceInput, UpstreamError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use tracing::{debug, info};

/// A model reference of the form `owner/name` or `owner/name:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl FromStr for ModelRef {
    type Err = UpstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UpstreamError::InvalidModelRef(s.to_string());

        let (path, version) = match s.split_once(':') {
            Some((path, version)) => (path, Some(version)),
            None => (s, None),
        };
        let (owner, name) = path.split_once('/').ok_or_else(invalid)?;

        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        if version.is_some_and(str::is_empty) {
            return Err(invalid());
        }

        Ok(ModelRef {
            owner: owner.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

/// Settings for [`ReplicateClient`], built once at startup.
#[derive(Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub model: ModelRef,
    pub base_url: String,
    pub poll_interval: Duration,
}

impl fmt::Debug for ReplicateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicateConfig")
            .field("api_token", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

pub struct ReplicateClient {
    client: reqwest::Client,
    api_token: String,
    model: ModelRef,
    base_url: String,
    poll_interval: Duration,
}

impl ReplicateClient {
    pub fn new(config: ReplicateConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(ReplicateClient {
            client,
            api_token: config.api_token,
            model: config.model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
        })
    }

    async fn create_prediction(&self, input: &InferenceInput) -> Result<Prediction, UpstreamError> {
        // Pinned versions go through the generic endpoint, bare models
        // through the model-scoped one.
        let url = match self.model.version {
            Some(_) => format!("{}/v1/predictions", self.base_url),
            None => format!(
                "{}/v1/models/{}/{}/predictions",
                self.base_url, self.model.owner, self.model.name
            ),
        };
        let body = CreatePredictionRequest {
            version: self.model.version.as_deref(),
            input,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;

        read_prediction(response).await
    }

    async fn wait_for_completion(&self, mut prediction: Prediction) -> Result<Prediction, UpstreamError> {
        if prediction.status.is_terminal() {
            return Ok(prediction);
        }

        // Poll responses may omit `urls`; keep the last link we were given.
        let mut poll_url = prediction
            .urls
            .take()
            .map(|urls| urls.get)
            .ok_or_else(|| {
                UpstreamError::MalformedResponse(format!(
                    "prediction {} has no polling URL",
                    prediction.id
                ))
            })?;

        while !prediction.status.is_terminal() {
            debug!(
                "Prediction {} is {:?}, polling again in {:?}",
                prediction.id, prediction.status, self.poll_interval
            );
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(&poll_url)
                .bearer_auth(&self.api_token)
                .send()
                .await?;
            prediction = read_prediction(response).await?;

            if let Some(urls) = prediction.urls.take() {
                poll_url = urls.get;
            }
        }

        Ok(prediction)
    }
}

#[async_trait]
impl ImageEditor for ReplicateClient {
    async fn edit(&self, input: &InferenceInput) -> Result<Vec<String>, UpstreamError> {
        let prediction = self.create_prediction(input).await?;
        info!("Created prediction {} on model {}", prediction.id, self.model);

        let prediction = self.wait_for_completion(prediction).await?;

        match prediction.status {
            PredictionStatus::Succeeded => Ok(prediction
                .output
                .map(PredictionOutput::into_urls)
                .unwrap_or_default()),
            PredictionStatus::Failed => Err(UpstreamError::PredictionFailed(
                prediction
                    .error_message()
                    .unwrap_or_else(|| format!("prediction {} failed", prediction.id)),
            )),
            PredictionStatus::Canceled => Err(UpstreamError::PredictionCanceled(prediction.id)),
            PredictionStatus::Starting | PredictionStatus::Processing => {
                Err(UpstreamError::MalformedResponse(format!(
                    "prediction {} did not finish",
                    prediction.id
                )))
            }
        }
    }
}

async fn read_prediction(response: reqwest::Response) -> Result<Prediction, UpstreamError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(parse_error(status.as_u16(), &text));
    }

    serde_json::from_str(&text).map_err(|e| UpstreamError::MalformedResponse(e.to_string()))
}

fn parse_error(status: u16, text: &str) -> UpstreamError {
    let message = match serde_json::from_str::<ErrorResponse>(text) {
        Ok(body) => body.detail,
        Err(_) if text.trim().is_empty() => "empty response body".to_string(),
        Err(_) => text.trim().to_string(),
    };

    UpstreamError::Api { status, message }
}

#[derive(Serialize, Debug)]
struct CreatePredictionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    input: &'a InferenceInput,
}

#[derive(Deserialize, Debug)]
struct ErrorResponse {
    detail: String,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum PredictionOutput {
    Many(Vec<String>),
    One(String),
}

impl PredictionOutput {
    fn into_urls(self) -> Vec<String> {
        match self {
            Self::Many(urls) => urls,
            Self::One(url) => vec![url],
        }
    }
}

#[derive(Deserialize, Debug)]
struct PredictionUrls {
    get: String,
}

#[derive(Deserialize, Debug)]
struct Prediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

impl Prediction {
    fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    const VERSIONED: &str = "timbrooks/instruct-pix2pix:30c1d0b9";

    // Binds first so the router can embed its own base URL in polling links.
    async fn spawn_fake(build: impl FnOnce(String) -> Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let router = build(base_url.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        base_url
    }

    fn client_for(base_url: &str, model: &str) -> ReplicateClient {
        ReplicateClient::new(ReplicateConfig {
            api_token: "test-token".to_string(),
            model: model.parse().unwrap(),
            base_url: format!("{}/", base_url),
            poll_interval: Duration::from_millis(1),
        })
        .unwrap()
    }

    fn sample_input() -> InferenceInput {
        InferenceInput {
            image: "data:image/png;base64,iVBORw==".to_string(),
            prompt: "make it sunset".to_string(),
            num_inference_steps: 20,
            image_guidance_scale: 1.5,
        }
    }

    #[test]
    fn test_model_ref_versioned() {
        let model: ModelRef = VERSIONED.parse().unwrap();
        assert_eq!(model.owner, "timbrooks");
        assert_eq!(model.name, "instruct-pix2pix");
        assert_eq!(model.version.as_deref(), Some("30c1d0b9"));
        assert_eq!(model.to_string(), VERSIONED);
    }

    #[test]
    fn test_model_ref_unversioned() {
        let model: ModelRef = "timbrooks/instruct-pix2pix".parse().unwrap();
        assert_eq!(model.version, None);
        assert_eq!(model.to_string(), "timbrooks/instruct-pix2pix");
    }

    #[test]
    fn test_model_ref_invalid() {
        for bad in ["", "instruct-pix2pix", "/name", "owner/", "a/b/c", "owner/name:"] {
            assert!(
                matches!(bad.parse::<ModelRef>(), Err(UpstreamError::InvalidModelRef(_))),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = ReplicateConfig {
            api_token: "r8_secret".to_string(),
            model: VERSIONED.parse().unwrap(),
            base_url: "https://api.replicate.com".to_string(),
            poll_interval: Duration::from_millis(500),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("r8_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_versioned_prediction_sends_version_and_input() {
        let seen: Arc<Mutex<Option<(HeaderMap, Value)>>> = Arc::default();
        let seen_in_handler = seen.clone();

        let base_url = spawn_fake(move |_| {
            Router::new().route(
                "/v1/predictions",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = seen_in_handler.clone();
                    async move {
                        *seen.lock().unwrap() = Some((headers, body));
                        Json(json!({
                            "id": "p1",
                            "status": "succeeded",
                            "output": ["http://x/1.png", "http://x/2.png"],
                        }))
                    }
                }),
            )
        })
        .await;

        let urls = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap();
        assert_eq!(urls, vec!["http://x/1.png", "http://x/2.png"]);

        let (headers, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(headers["authorization"], "Bearer test-token");
        assert_eq!(headers["prefer"], "wait");
        assert_eq!(body["version"], "30c1d0b9");
        assert_eq!(body["input"]["prompt"], "make it sunset");
        assert_eq!(body["input"]["image"], "data:image/png;base64,iVBORw==");
        assert_eq!(body["input"]["num_inference_steps"], 20);
        assert_eq!(body["input"]["image_guidance_scale"], 1.5);
    }

    #[tokio::test]
    async fn test_unversioned_prediction_uses_model_endpoint() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let seen_in_handler = seen.clone();

        let base_url = spawn_fake(move |_| {
            Router::new().route(
                "/v1/models/timbrooks/instruct-pix2pix/predictions",
                post(move |Json(body): Json<Value>| {
                    let seen = seen_in_handler.clone();
                    async move {
                        *seen.lock().unwrap() = Some(body);
                        Json(json!({
                            "id": "p1",
                            "status": "succeeded",
                            "output": "http://x/only.png",
                        }))
                    }
                }),
            )
        })
        .await;

        let urls = client_for(&base_url, "timbrooks/instruct-pix2pix")
            .edit(&sample_input())
            .await
            .unwrap();
        assert_eq!(urls, vec!["http://x/only.png"]);

        let body = seen.lock().unwrap().take().unwrap();
        assert!(body.get("version").is_none());
        assert_eq!(body["input"]["prompt"], "make it sunset");
    }

    #[tokio::test]
    async fn test_polls_until_succeeded() {
        let polls = Arc::new(AtomicUsize::new(0));
        let polls_in_handler = polls.clone();

        let base_url = spawn_fake(move |base_url| {
            let get_url = format!("{}/v1/predictions/p1", base_url);
            Router::new()
                .route(
                    "/v1/predictions",
                    post(move || async move {
                        Json(json!({
                            "id": "p1",
                            "status": "starting",
                            "output": null,
                            "urls": { "get": get_url },
                        }))
                    }),
                )
                .route(
                    "/v1/predictions/p1",
                    get(move || {
                        let polls = polls_in_handler.clone();
                        async move {
                            if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                                Json(json!({ "id": "p1", "status": "processing" }))
                            } else {
                                Json(json!({
                                    "id": "p1",
                                    "status": "succeeded",
                                    "output": ["http://x/done.png"],
                                }))
                            }
                        }
                    }),
                )
        })
        .await;

        let urls = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap();
        assert_eq!(urls, vec!["http://x/done.png"]);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    // Fake that reports `processing` on create and `terminal` on the first poll.
    async fn spawn_polled_fake(terminal: Value) -> String {
        spawn_fake(move |base_url| {
            let get_url = format!("{}/v1/predictions/p6", base_url);
            Router::new()
                .route(
                    "/v1/predictions",
                    post(move || async move {
                        Json(json!({
                            "id": "p6",
                            "status": "processing",
                            "urls": { "get": get_url },
                        }))
                    }),
                )
                .route(
                    "/v1/predictions/p6",
                    get(move || async move { Json(terminal) }),
                )
        })
        .await
    }

    #[tokio::test]
    async fn test_polled_prediction_failure_passes_error_through() {
        let base_url = spawn_polled_fake(json!({
            "id": "p6",
            "status": "failed",
            "error": "timeout while generating image",
        }))
        .await;

        let err = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::PredictionFailed(_)));
        assert_eq!(err.to_string(), "timeout while generating image");
    }

    #[tokio::test]
    async fn test_polled_prediction_canceled() {
        let base_url = spawn_polled_fake(json!({ "id": "p6", "status": "canceled" })).await;

        let err = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::PredictionCanceled(ref id) if id == "p6"));
    }

    #[tokio::test]
    async fn test_failed_prediction_passes_error_through() {
        let base_url = spawn_fake(|_| {
            Router::new().route(
                "/v1/predictions",
                post(|| async {
                    Json(json!({
                        "id": "p2",
                        "status": "failed",
                        "output": null,
                        "error": "timeout while loading model",
                    }))
                }),
            )
        })
        .await;

        let err = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::PredictionFailed(_)));
        assert_eq!(err.to_string(), "timeout while loading model");
    }

    #[tokio::test]
    async fn test_canceled_prediction() {
        let base_url = spawn_fake(|_| {
            Router::new().route(
                "/v1/predictions",
                post(|| async { Json(json!({ "id": "p3", "status": "canceled" })) }),
            )
        })
        .await;

        let err = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::PredictionCanceled(ref id) if id == "p3"));
    }

    #[tokio::test]
    async fn test_api_error_uses_detail() {
        let base_url = spawn_fake(|_| {
            Router::new().route(
                "/v1/predictions",
                post(|| async {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({ "detail": "Invalid token." })),
                    )
                }),
            )
        })
        .await;

        let err = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap_err();
        match err {
            UpstreamError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid token.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_api_error_plain_text_body() {
        let base_url = spawn_fake(|_| {
            Router::new().route(
                "/v1/predictions",
                post(|| async { (StatusCode::BAD_GATEWAY, "upstream down\n") }),
            )
        })
        .await;

        let err = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "inference API error: 502 - upstream down");
    }

    #[tokio::test]
    async fn test_malformed_prediction_body() {
        let base_url = spawn_fake(|_| {
            Router::new().route(
                "/v1/predictions",
                post(|| async { Json(json!({ "id": "p4", "status": "exploded" })) }),
            )
        })
        .await;

        let err = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_pending_prediction_without_polling_url() {
        let base_url = spawn_fake(|_| {
            Router::new().route(
                "/v1/predictions",
                post(|| async { Json(json!({ "id": "p5", "status": "processing" })) }),
            )
        })
        .await;

        let err = client_for(&base_url, VERSIONED)
            .edit(&sample_input())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed response from inference service: prediction p5 has no polling URL"
        );
    }
}
