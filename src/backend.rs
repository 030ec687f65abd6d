//! Model backends.
//!
//! Evaluators never talk to a model directly: generative models sit behind
//! an OpenAI-compatible chat endpoint, the similarity model behind a small
//! JSON service. Both follow the same load / infer / unload lifecycle.

use crate::error::{InferenceError, LoadError};
use crate::models::finite_or_zero;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        ImageDetail, ImageUrlArgs,
    },
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Upper bound on one memory sample
const MEMORY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved connection settings for one backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub endpoint: String,
    pub model: String,
    pub env_var_api_key: Option<String>,
    pub max_tokens: u16,
    pub memory_endpoint: Option<String>,
}

impl BackendSettings {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }
}

/// Screenshot bytes ready to be sent to a backend
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageInput {
    pub async fn read(name: &str, path: &Path) -> Result<Self, InferenceError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| InferenceError::Image {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            bytes,
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }
}

/// Generative vision-language model: image plus prompt in, text out
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn load(&mut self) -> Result<(), LoadError>;
    async fn generate(&self, image: &ImageInput, prompt: &str) -> Result<String, InferenceError>;
    async fn unload(&mut self);
    async fn memory_usage_mb(&self) -> f64;
}

/// Contrastive image-text model: image plus candidate texts in, one logit per text out
#[async_trait]
pub trait SimilarityBackend: Send + Sync {
    async fn load(&mut self) -> Result<(), LoadError>;
    async fn logits(&self, image: &ImageInput, texts: &[String]) -> Result<Vec<f64>, InferenceError>;
    async fn unload(&mut self);
    async fn memory_usage_mb(&self) -> f64;
}

/// Samples accelerator memory from an optional HTTP endpoint
#[derive(Debug, Clone)]
pub struct MemoryProbe {
    client: reqwest::Client,
    url: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct MemoryReport {
    allocated_mb: f64,
}

impl MemoryProbe {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout: MEMORY_PROBE_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current usage in MB, or 0.0 when no probe is configured, it fails
    /// or it does not answer in time
    pub async fn sample_mb(&self) -> f64 {
        let Some(url) = &self.url else {
            return 0.0;
        };
        match tokio::time::timeout(self.timeout, self.fetch(url)).await {
            Ok(Ok(mb)) => finite_or_zero(mb),
            Ok(Err(e)) => {
                debug!(url = %url, error = %e, "memory probe failed");
                0.0
            }
            Err(_) => {
                debug!(url = %url, timeout_ms = self.timeout.as_millis() as u64, "memory probe timed out");
                0.0
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<f64, reqwest::Error> {
        let report: MemoryReport = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(report.allocated_mb)
    }
}

/// Vision model served through an OpenAI-compatible chat completions API
pub struct OpenAiVisionBackend {
    settings: BackendSettings,
    client: Option<Client<OpenAIConfig>>,
    memory: MemoryProbe,
}

impl OpenAiVisionBackend {
    pub fn new(settings: BackendSettings) -> Self {
        let memory = MemoryProbe::new(settings.memory_endpoint.clone());
        Self {
            settings,
            client: None,
            memory,
        }
    }

    /// Create the OpenAI client for the configured endpoint
    fn create_client(&self) -> Result<Client<OpenAIConfig>, LoadError> {
        let mut openai_config = OpenAIConfig::new().with_api_base(&self.settings.endpoint);

        if let Some(var) = &self.settings.env_var_api_key {
            let api_key =
                std::env::var(var).map_err(|_| LoadError::MissingApiKey(var.clone()))?;
            openai_config = openai_config.with_api_key(api_key);
        }

        Ok(Client::with_config(openai_config))
    }

    /// Build a single-turn request carrying the image and the prompt
    fn build_request(
        &self,
        image: &ImageInput,
        prompt: &str,
    ) -> Result<CreateChatCompletionRequest, InferenceError> {
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(image.data_url())
                    .detail(ImageDetail::Auto)
                    .build()?,
            )
            .build()?;

        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(prompt)
            .build()?;

        let content = ChatCompletionRequestUserMessageContent::Array(vec![
            ChatCompletionRequestUserMessageContentPart::ImageUrl(image_part),
            ChatCompletionRequestUserMessageContentPart::Text(text_part),
        ]);

        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()?
                .into();

        Ok(CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .messages([user_message])
            .temperature(0.0)
            .max_tokens(self.settings.max_tokens)
            .build()?)
    }
}

/// Text of the first choice, empty when the model returned nothing
fn extract_content(response: CreateChatCompletionResponse) -> String {
    match response.choices.into_iter().next() {
        Some(choice) => choice.message.content.unwrap_or_default(),
        None => String::new(),
    }
}

#[async_trait]
impl VisionBackend for OpenAiVisionBackend {
    async fn load(&mut self) -> Result<(), LoadError> {
        let client = self.create_client()?;

        client
            .models()
            .retrieve(&self.settings.model)
            .await
            .map_err(|e| LoadError::ModelUnavailable {
                model: self.settings.model.clone(),
                reason: e.to_string(),
            })?;

        debug!(model = %self.settings.model, endpoint = %self.settings.endpoint, "model available");
        self.client = Some(client);
        Ok(())
    }

    async fn generate(&self, image: &ImageInput, prompt: &str) -> Result<String, InferenceError> {
        let client = self.client.as_ref().ok_or(InferenceError::NotLoaded)?;
        let request = self.build_request(image, prompt)?;

        debug!(model = %self.settings.model, image = %image.name, "requesting completion");
        let response = client.chat().create(request).await?;

        Ok(extract_content(response))
    }

    async fn unload(&mut self) {
        if self.client.take().is_some() {
            debug!(model = %self.settings.model, "released client");
        }
    }

    async fn memory_usage_mb(&self) -> f64 {
        self.memory.sample_mb().await
    }
}

#[derive(Serialize)]
struct ModelRequest<'a> {
    model: &'a str,
}

#[derive(Serialize)]
struct SimilarityRequest<'a> {
    model: &'a str,
    /// Base64-encoded PNG
    image: String,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct SimilarityResponse {
    logits: Vec<f64>,
}

/// Similarity model hosted by a JSON service exposing `/load`, `/similarity` and `/unload`
pub struct HttpSimilarityBackend {
    settings: BackendSettings,
    client: Option<reqwest::Client>,
    memory: MemoryProbe,
}

impl HttpSimilarityBackend {
    pub fn new(settings: BackendSettings) -> Self {
        let memory = MemoryProbe::new(settings.memory_endpoint.clone());
        Self {
            settings,
            client: None,
            memory,
        }
    }
}

#[async_trait]
impl SimilarityBackend for HttpSimilarityBackend {
    async fn load(&mut self) -> Result<(), LoadError> {
        let client = reqwest::Client::new();
        let url = self.settings.url("load");

        let response = client
            .post(&url)
            .json(&ModelRequest {
                model: &self.settings.model,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LoadError::Backend {
                reason: format!("{} returned {}", url, response.status()),
            });
        }

        debug!(model = %self.settings.model, "similarity model loaded");
        self.client = Some(client);
        Ok(())
    }

    async fn logits(&self, image: &ImageInput, texts: &[String]) -> Result<Vec<f64>, InferenceError> {
        let client = self.client.as_ref().ok_or(InferenceError::NotLoaded)?;

        debug!(model = %self.settings.model, image = %image.name, "requesting similarity");
        let response: SimilarityResponse = client
            .post(self.settings.url("similarity"))
            .json(&SimilarityRequest {
                model: &self.settings.model,
                image: image.to_base64(),
                texts,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.logits.len() != texts.len() {
            return Err(InferenceError::MalformedResponse(format!(
                "expected {} logits, got {}",
                texts.len(),
                response.logits.len()
            )));
        }

        Ok(response.logits)
    }

    async fn unload(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let result = client
            .post(self.settings.url("unload"))
            .json(&ModelRequest {
                model: &self.settings.model,
            })
            .send()
            .await;
        if let Err(e) = result {
            debug!(model = %self.settings.model, error = %e, "unload request failed");
        }
    }

    async fn memory_usage_mb(&self) -> f64 {
        self.memory.sample_mb().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(endpoint: String) -> BackendSettings {
        BackendSettings {
            endpoint,
            model: "test-model".to_string(),
            env_var_api_key: None,
            max_tokens: 100,
            memory_endpoint: None,
        }
    }

    fn image() -> ImageInput {
        ImageInput {
            name: "home.png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    const MODEL_JSON: &str =
        r#"{"id": "test-model", "object": "model", "created": 1700000000, "owned_by": "local"}"#;

    const COMPLETION_JSON: &str = r#"{
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Colors: 8\nOverall: 7"},
            "finish_reason": "stop"
        }]
    }"#;

    #[test]
    fn test_data_url() {
        assert_eq!(image().data_url(), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_url_joining() {
        let s = settings("http://localhost:8100/".to_string());
        assert_eq!(s.url("load"), "http://localhost:8100/load");
    }

    #[tokio::test]
    async fn test_read_missing_image() {
        let err = ImageInput::read("x.png", Path::new("/nonexistent/x.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Image { .. }));
    }

    #[tokio::test]
    async fn test_openai_backend_generate() {
        let mut server = mockito::Server::new_async().await;
        let model_mock = server
            .mock("GET", "/models/test-model")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(MODEL_JSON)
            .create_async()
            .await;
        let chat_mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("data:image/png;base64".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(COMPLETION_JSON)
            .create_async()
            .await;

        let mut backend = OpenAiVisionBackend::new(settings(server.url()));
        backend.load().await.unwrap();
        let text = backend.generate(&image(), "Rate this UI").await.unwrap();

        assert_eq!(text, "Colors: 8\nOverall: 7");
        model_mock.assert_async().await;
        chat_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_backend_generate_before_load() {
        let backend = OpenAiVisionBackend::new(settings("http://localhost:1".to_string()));
        let err = backend.generate(&image(), "Rate this UI").await.unwrap_err();
        assert!(matches!(err, InferenceError::NotLoaded));
    }

    #[tokio::test]
    async fn test_openai_backend_unknown_model() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models/test-model")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"message": "model not found", "type": "invalid_request_error", "param": null, "code": null}}"#)
            .create_async()
            .await;

        let mut backend = OpenAiVisionBackend::new(settings(server.url()));
        let err = backend.load().await.unwrap_err();
        assert!(matches!(err, LoadError::ModelUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_openai_backend_missing_api_key() {
        let mut s = settings("http://localhost:1".to_string());
        s.env_var_api_key = Some("VLM_UI_BENCH_TEST_MISSING_KEY".to_string());
        let mut backend = OpenAiVisionBackend::new(s);

        let err = backend.load().await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_similarity_backend_lifecycle() {
        let mut server = mockito::Server::new_async().await;
        let load_mock = server
            .mock("POST", "/load")
            .match_body(mockito::Matcher::Json(serde_json::json!({"model": "test-model"})))
            .with_status(200)
            .create_async()
            .await;
        let similarity_mock = server
            .mock("POST", "/similarity")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "image": "iVBORw==",
                "texts": ["good", "bad"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"logits": [2.5, 0.5]}"#)
            .create_async()
            .await;
        let unload_mock = server.mock("POST", "/unload").with_status(200).create_async().await;

        let mut backend = HttpSimilarityBackend::new(settings(server.url()));
        backend.load().await.unwrap();
        let logits = backend
            .logits(&image(), &["good".to_string(), "bad".to_string()])
            .await
            .unwrap();
        backend.unload().await;

        assert_eq!(logits, vec![2.5, 0.5]);
        load_mock.assert_async().await;
        similarity_mock.assert_async().await;
        unload_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_similarity_backend_rejected_load() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/load").with_status(507).create_async().await;

        let mut backend = HttpSimilarityBackend::new(settings(server.url()));
        let err = backend.load().await.unwrap_err();
        assert!(err.to_string().contains("507"));
    }

    #[tokio::test]
    async fn test_similarity_backend_wrong_logit_count() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/load").with_status(200).create_async().await;
        server
            .mock("POST", "/similarity")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"logits": [1.0]}"#)
            .create_async()
            .await;

        let mut backend = HttpSimilarityBackend::new(settings(server.url()));
        backend.load().await.unwrap();
        let err = backend
            .logits(&image(), &["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_unload_without_load_is_noop() {
        let mut backend = HttpSimilarityBackend::new(settings("http://localhost:1".to_string()));
        backend.unload().await;
        let mut backend = OpenAiVisionBackend::new(settings("http://localhost:1".to_string()));
        backend.unload().await;
    }

    #[tokio::test]
    async fn test_memory_probe() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/memory")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"allocated_mb": 1536.5}"#)
            .create_async()
            .await;

        let probe = MemoryProbe::new(Some(format!("{}/memory", server.url())));
        assert_eq!(probe.sample_mb().await, 1536.5);

        assert_eq!(MemoryProbe::new(None).sample_mb().await, 0.0);
    }

    #[tokio::test]
    async fn test_memory_probe_failure_reports_zero() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/memory").with_status(500).create_async().await;

        let probe = MemoryProbe::new(Some(format!("{}/memory", server.url())));
        assert_eq!(probe.sample_mb().await, 0.0);
    }

    #[tokio::test]
    async fn test_memory_probe_unresponsive_endpoint_times_out() {
        // accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/memory", listener.local_addr().unwrap());

        let probe = MemoryProbe::new(Some(url)).with_timeout(Duration::from_millis(100));
        let sample = tokio::time::timeout(Duration::from_secs(5), probe.sample_mb())
            .await
            .expect("memory probe should give up on its own");
        assert_eq!(sample, 0.0);
    }
}
