// src/llm/gemini.rs

use crate::config::GenerationSettings;
use crate::conversation::{Role, Turn};
use crate::error::ResolutionError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

// --- Request Structs ---

#[derive(Serialize, Debug)]
pub struct GeminiRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Serialize, Debug)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
    #[serde(rename = "topP")]
    pub top_p: f32,
    #[serde(rename = "topK")]
    pub top_k: u32,
}

impl From<&GenerationSettings> for GenerationConfig {
    fn from(settings: &GenerationSettings) -> Self {
        GenerationConfig {
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            top_p: settings.top_p,
            top_k: settings.top_k,
        }
    }
}

// --- Response Structs ---

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ContentResponse {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize, Debug)]
struct GeminiListModelsResponse {
    models: Option<Vec<GeminiModelInfo>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeminiModelInfo {
    pub name: String,
    #[serde(rename = "supportedGenerationMethods")]
    pub supported_generation_methods: Option<Vec<String>>,
}

impl GeminiModelInfo {
    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .any(|m| m == "generateContent")
    }

    /// Model id without the `models/` prefix.
    pub fn id(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }
}

// --- Outcome of a single attempt ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    EmptyResponse,
    QuotaExceeded,
    /// 401/403/404. `status` tells a rejected key apart from a missing model.
    InvalidCredentialOrModel { status: u16 },
    ProviderError(u16),
    TimedOut,
    TransportError(String),
}

impl Outcome {
    pub fn is_model_not_found(&self) -> bool {
        matches!(self, Outcome::InvalidCredentialOrModel { status: 404 })
    }

    /// Classifies a status code plus raw body into an outcome.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Outcome {
        match status {
            StatusCode::OK => match serde_json::from_slice::<GeminiResponse>(body) {
                Ok(parsed) => match first_candidate_text(parsed) {
                    Some(text) => Outcome::Success(text),
                    None => Outcome::EmptyResponse,
                },
                Err(parse_error) => {
                    warn!(error = ?parse_error, body = ?String::from_utf8_lossy(body), "Failed to parse generate response");
                    Outcome::TransportError(format!("malformed response: {}", parse_error))
                }
            },
            StatusCode::TOO_MANY_REQUESTS => Outcome::QuotaExceeded,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Outcome::InvalidCredentialOrModel { status: status.as_u16() }
            }
            other => Outcome::ProviderError(other.as_u16()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(_) => write!(f, "[OK]"),
            Outcome::EmptyResponse => write!(f, "[WARNING] Empty response"),
            Outcome::QuotaExceeded => write!(f, "[WARNING] Quota exceeded"),
            Outcome::InvalidCredentialOrModel { status: 404 } => {
                write!(f, "[ERROR] Model not found (404)")
            }
            Outcome::InvalidCredentialOrModel { status } => {
                write!(f, "[ERROR] Key rejected ({})", status)
            }
            Outcome::ProviderError(code) => write!(f, "[ERROR] {}", code),
            Outcome::TimedOut => write!(f, "[TIMEOUT] The request took too long"),
            Outcome::TransportError(detail) => write!(f, "[ERROR] {}", detail),
        }
    }
}

fn first_candidate_text(response: GeminiResponse) -> Option<String> {
    let candidate = response.candidates?.into_iter().next()?;
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            warn!("Gemini generation finished due to reason: {}", reason);
        }
    }
    let text: String = candidate
        .content?
        .parts?
        .into_iter()
        .map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Builds the outbound payload: history oldest first, then the new user message.
pub fn build_request(history: &[Turn], message: &str, settings: &GenerationSettings) -> GeminiRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|turn| Content {
            role: turn.role.as_provider_role().to_string(),
            parts: vec![Part { text: turn.text.clone() }],
        })
        .collect();
    contents.push(Content {
        role: Role::User.as_provider_role().to_string(),
        parts: vec![Part { text: message.to_string() }],
    });
    GeminiRequest {
        contents,
        generation_config: settings.into(),
    }
}

/// Thin client for the generateContent and models endpoints.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// One generate attempt. Every failure is folded into the returned [`Outcome`].
    #[instrument(skip(self, history, message, api_key, settings), fields(history_len = history.len()))]
    pub async fn generate(
        &self,
        history: &[Turn],
        message: &str,
        api_key: &str,
        model: &str,
        settings: &GenerationSettings,
    ) -> Outcome {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let payload = build_request(history, message, settings);
        debug!(?url, contents = payload.contents.len(), "Sending generate request to Gemini API");

        let response = match self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_transport_error(e),
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return classify_transport_error(e),
        };
        let outcome = Outcome::from_response(status, &body);
        if !status.is_success() {
            debug!(%status, body = ?String::from_utf8_lossy(&body), "Gemini returned an error status");
        }
        outcome
    }

    #[instrument(skip(self, api_key))]
    pub async fn list_models(&self, api_key: &str) -> Result<Vec<GeminiModelInfo>, ResolutionError> {
        let url = format!("{}/models", self.base_url);
        debug!("Sending list models request to Gemini API: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(reqwest::Error::without_url)?;
        let list: GeminiListModelsResponse = serde_json::from_slice(&bytes)?;
        Ok(list.models.unwrap_or_default())
    }
}

// The request URL carries the key as a query parameter, so it is stripped before logging.
fn classify_transport_error(e: reqwest::Error) -> Outcome {
    let e = e.without_url();
    if e.is_timeout() {
        warn!("Gemini request timed out");
        Outcome::TimedOut
    } else {
        warn!(error = ?e, "Gemini request failed");
        Outcome::TransportError(e.to_string())
    }
}
