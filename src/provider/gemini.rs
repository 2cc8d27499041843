//! Google Gemini `generateContent` over REST.
//!
//! One request carries the prompt and the image as two parts of a single
//! user turn, with `responseMimeType: application/json` and the bill schema
//! as `responseSchema`. The answer text is the concatenation of the first
//! candidate's text parts, skipping "thought" parts.

use super::{ExtractionProvider, ExtractionRequest, ProviderResponse};
use crate::config::GatewayConfig;
use crate::error::BillError;
use crate::schema::Schema;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Gemini REST client. Cheap to share; holds one connection pool.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, BillError> {
        Ok(Self {
            client: build_client(None)?,
            api_key: api_key.into(),
            base_url: crate::config::DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, BillError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BillError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: format!("{} environment variable is not set", crate::config::API_KEY_ENV),
            })?;
        Ok(Self {
            client: build_client(config.api_timeout_secs)?,
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

fn build_client(timeout_secs: Option<u64>) -> Result<Client, BillError> {
    let mut builder = Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| BillError::Internal(format!("HTTP client: {e}")))
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Schema,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

fn build_body(request: &ExtractionRequest) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part::Text {
                    text: &request.prompt,
                },
                Part::Inline {
                    inline_data: InlineData {
                        mime_type: &request.image.mime_type,
                        data: &request.image.data,
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: request.schema,
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        },
    }
}

#[async_trait]
impl ExtractionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &ExtractionRequest) -> Result<ProviderResponse, BillError> {
        let start = Instant::now();
        debug!(model = %self.model, mime_type = %request.image.mime_type, "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| BillError::Upstream {
                message: if e.is_timeout() {
                    format!("Gemini request timed out: {e}")
                } else {
                    format!("Gemini request failed: {e}")
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillError::Upstream {
                message: format!("Gemini returned {status}: {body}"),
            });
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| BillError::Upstream {
                message: format!("Failed to parse Gemini response: {e}"),
            })?;

        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            warn!("Gemini blocked the prompt: {}", reason);
        }

        let (input_tokens, output_tokens) = parsed
            .usage_metadata
            .as_ref()
            .map(|u| (u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        debug!(
            "Gemini answered in {:?}: {} input tokens, {} output tokens, finish reason {:?}",
            start.elapsed(),
            input_tokens,
            output_tokens,
            parsed.candidates.first().and_then(|c| c.finish_reason.as_deref())
        );

        Ok(ProviderResponse {
            text: parsed.text(),
            input_tokens,
            output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::data_uri::ImagePayload;
    use crate::schema::BILL_SCHEMA;
    use serde_json::json;

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            prompt: "leggi".into(),
            image: ImagePayload::parse("data:image/png;base64,AAAA"),
            schema: &BILL_SCHEMA,
            temperature: 0.1,
            max_output_tokens: None,
        }
    }

    #[test]
    fn body_has_prompt_then_image() {
        let req = request();
        let v = serde_json::to_value(build_body(&req)).unwrap();
        let parts = &v["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "leggi");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AAAA");
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(v["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert!(v["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn response_text_concatenates_parts_and_skips_thoughts() {
        let r: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "planning…", "thought": true },
                    { "text": "{\"a\":" },
                    { "text": "1}" }
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(r.text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn response_without_candidates_has_no_text() {
        let r: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
                .unwrap();
        assert_eq!(r.text(), None);
    }

    #[test]
    fn blank_text_is_no_text() {
        let r: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "  " }] } }]
        }))
        .unwrap();
        assert_eq!(r.text(), None);
    }

    #[test]
    fn endpoint_includes_model() {
        let p = GeminiProvider::new("k", "gemini-2.5-flash")
            .unwrap()
            .with_base_url("http://localhost:1/");
        assert_eq!(
            p.endpoint(),
            "http://localhost:1/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
