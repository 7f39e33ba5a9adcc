//! HTTP provider implementations.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};

use super::types::{AudioHandle, ReasoningRequest};
use super::{ReasoningProvider, SynthesisProvider};

/// Configuration shared by the HTTP provider clients.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Default model / voice-model identifier
    pub model: Option<String>,
    /// Request timeout in seconds (outer bound; callers apply tighter
    /// per-step timeouts on top)
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: None,
            timeout_secs: 60,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn build_http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Classify an HTTP status for the retry policy.
fn status_error(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status, body);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ProviderError::transient(provider, message)
    } else {
        ProviderError::permanent(provider, message)
    }
}

fn transport_error(provider: &str, err: reqwest::Error) -> ProviderError {
    ProviderError::transient(provider, format!("HTTP request failed: {}", err))
}

/// Google Gemini reasoning client.
pub struct GeminiClient {
    config: ProviderConfig,
    http: Client,
}

impl GeminiClient {
    const PROVIDER: &'static str = "gemini";
    const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";
    const DEFAULT_MODEL: &'static str = "gemini-2.0-flash";

    pub fn new(config: ProviderConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }

    fn model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(Self::DEFAULT_MODEL)
    }
}

// Gemini API types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![GeminiPart { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[async_trait]
impl ReasoningProvider for GeminiClient {
    async fn generate(&self, request: ReasoningRequest) -> ProviderResult<String> {
        let generation_config = GeminiGenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            response_mime_type: request
                .json_output
                .then(|| "application/json".to_string()),
        };

        let api_request = GeminiRequest {
            contents: vec![GeminiContent::text(request.prompt)],
            system_instruction: request.system.map(GeminiContent::text),
            generation_config: Some(generation_config),
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url(),
            self.model()
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(Self::PROVIDER, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(Self::PROVIDER, e))?;

        if !status.is_success() {
            return Err(status_error(Self::PROVIDER, status, &body));
        }

        let api_response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::permanent(Self::PROVIDER, format!("failed to parse response: {}", e))
        })?;

        let text = api_response
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::permanent(
                Self::PROVIDER,
                "response contained no candidates",
            ));
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        Self::PROVIDER
    }
}

/// Cartesia speech-synthesis client.
pub struct CartesiaClient {
    config: ProviderConfig,
    http: Client,
}

impl CartesiaClient {
    const PROVIDER: &'static str = "cartesia";
    const DEFAULT_BASE_URL: &'static str = "https://api.cartesia.ai";
    const DEFAULT_MODEL: &'static str = "sonic-english";
    const API_VERSION: &'static str = "2024-06-10";

    pub fn new(config: ProviderConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Serialize)]
struct CartesiaRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: CartesiaVoice<'a>,
    output_format: CartesiaOutputFormat<'a>,
}

#[derive(Debug, Serialize)]
struct CartesiaVoice<'a> {
    mode: &'a str,
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct CartesiaOutputFormat<'a> {
    container: &'a str,
    encoding: &'a str,
    sample_rate: u32,
}

#[async_trait]
impl SynthesisProvider for CartesiaClient {
    async fn speak(&self, text: &str, voice: &str) -> ProviderResult<AudioHandle> {
        let api_request = CartesiaRequest {
            model_id: self.config.model.as_deref().unwrap_or(Self::DEFAULT_MODEL),
            transcript: text,
            voice: CartesiaVoice { mode: "id", id: voice },
            output_format: CartesiaOutputFormat {
                container: "wav",
                encoding: "pcm_s16le",
                sample_rate: 24_000,
            },
        };

        let url = format!("{}/tts/bytes", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.config.api_key)
            .header("Cartesia-Version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(Self::PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Self::PROVIDER, status, &body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| transport_error(Self::PROVIDER, e))?;

        Ok(AudioHandle::new(voice, "audio/wav").with_byte_len(audio.len() as u64))
    }

    fn name(&self) -> &str {
        Self::PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;

    #[test]
    fn test_status_classification() {
        let e = status_error("gemini", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(e.kind, ProviderErrorKind::Transient);

        let e = status_error("gemini", StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert_eq!(e.kind, ProviderErrorKind::Transient);

        let e = status_error("gemini", StatusCode::BAD_REQUEST, "malformed");
        assert_eq!(e.kind, ProviderErrorKind::Permanent);

        let e = status_error("cartesia", StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(e.kind, ProviderErrorKind::Permanent);
    }

    #[test]
    fn test_gemini_request_shape() {
        let request = GeminiRequest {
            contents: vec![GeminiContent::text("hello")],
            system_instruction: Some(GeminiContent::text("be brief")),
            generation_config: Some(GeminiGenerationConfig {
                temperature: Some(0.4),
                max_output_tokens: Some(256),
                response_mime_type: Some("application/json".to_string()),
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
    }
}
