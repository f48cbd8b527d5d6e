//! HTTP backend for `generateContent`-style REST APIs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::excerpt;
use super::generative::{GenerateRequest, GenerateResponse, GenerativeBackend, Modality};
use crate::config::{BackendConfig, ConfigError};
use crate::contract::DataUri;
use crate::error::InvocationError;
use crate::template::Part;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Finish reasons that mean the model refused rather than ran dry.
const REJECTING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "IMAGE_SAFETY",
];

/// [`GenerativeBackend`] over the Gemini `generateContent` REST API.
///
/// Structured requests carry the output schema as a trailing instruction and ask for
/// `application/json`; media requests go to the media model with image output enabled.
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    media_model: String,
    api_key: Option<String>,
}

impl fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("media_model", &self.media_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl GeminiBackend {
    /// Build from configuration, reading the API key from the variable named by
    /// `api_key_env`.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                variable = %config.api_key_env,
                "no API key in environment; backend requests will be unauthenticated"
            );
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            media_model: config.media_model.clone(),
            api_key,
        })
    }

    /// Replace the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn url_for(&self, modality: Modality) -> String {
        let model = match modality {
            Modality::Structured => &self.model,
            Modality::Media => &self.media_model,
        };
        format!("{}/v1beta/models/{}:generateContent", self.endpoint, model)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, InvocationError> {
        let url = self.url_for(request.modality);
        let body = request_body(&request);
        debug!(%url, modality = ?request.modality, "sending generateContent request");

        let mut call = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            call = call.header(API_KEY_HEADER, key);
        }
        let response = call
            .send()
            .await
            .map_err(|e| InvocationError::from_reqwest(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| InvocationError::from_reqwest(&e))?;
        if !status.is_success() {
            return Err(InvocationError::TransportFailure(format!(
                "backend returned HTTP {}: {}",
                status.as_u16(),
                excerpt(&text)
            )));
        }

        let reply: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            InvocationError::TransportFailure(format!("undecodable backend response: {e}"))
        })?;
        interpret(reply)
    }
}

// ---------------------------------------------------------------------------
// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing)]
    thought: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<[&'static str; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn request_body(request: &GenerateRequest) -> GenerateContentRequest {
    let mut parts: Vec<WirePart> = request
        .parts
        .parts()
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart {
                text: Some(text.clone()),
                ..WirePart::default()
            },
            Part::Media(uri) => WirePart {
                inline_data: Some(InlineData {
                    mime_type: uri.mime_type().to_string(),
                    data: uri.data().to_string(),
                }),
                ..WirePart::default()
            },
        })
        .collect();

    let generation_config = match request.modality {
        Modality::Structured => {
            parts.push(WirePart {
                text: Some(schema_instruction(&request.output_schema)),
                ..WirePart::default()
            });
            GenerationConfig {
                response_mime_type: Some("application/json"),
                ..GenerationConfig::default()
            }
        },
        Modality::Media => GenerationConfig {
            response_modalities: Some(["TEXT", "IMAGE"]),
            ..GenerationConfig::default()
        },
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config,
    }
}

fn schema_instruction(schema: &Value) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "Respond with a single JSON object that conforms to this JSON Schema. \
         Do not wrap it in Markdown and do not add commentary.\n{pretty}"
    )
}

fn interpret(reply: GenerateContentResponse) -> Result<GenerateResponse, InvocationError> {
    if let Some(reason) = reply.prompt_feedback.and_then(|f| f.block_reason) {
        warn!(%reason, "backend blocked the prompt");
        return Err(InvocationError::UpstreamRejected(format!(
            "prompt blocked: {reason}"
        )));
    }

    let Some(candidate) = reply.candidates.into_iter().next() else {
        return Ok(GenerateResponse::empty());
    };
    if let Some(reason) = candidate
        .finish_reason
        .as_deref()
        .filter(|r| REJECTING_FINISH_REASONS.contains(r))
    {
        warn!(%reason, "backend refused to finish the candidate");
        return Err(InvocationError::UpstreamRejected(format!(
            "generation stopped: {reason}"
        )));
    }

    let parts = candidate.content.unwrap_or_default().parts;
    let mut text = String::new();
    let mut media = None;
    for part in parts {
        if part.thought {
            continue;
        }
        if let Some(chunk) = part.text {
            text.push_str(&chunk);
        }
        if media.is_none() {
            if let Some(inline) = part.inline_data {
                let uri = DataUri::from_base64(&inline.mime_type, inline.data).map_err(|e| {
                    InvocationError::TransportFailure(format!("backend returned malformed media: {e}"))
                })?;
                media = Some(uri);
            }
        }
    }

    Ok(GenerateResponse {
        structured: parse_structured(&text),
        media,
    })
}

/// Parse candidate text as JSON, tolerating Markdown fences.
///
/// Text that is not JSON comes back as a JSON string so the output contract rejects it.
fn parse_structured(text: &str) -> Option<Value> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string (`json`, `JSON`, ...).
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}
