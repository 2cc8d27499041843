//! Structured extraction: one provider call, then parse and validate.
//!
//! This module turns an [`ImagePayload`] into a validated [`BillData`]. Prompt
//! text lives in [`crate::prompts`] and the answer shape in
//! [`crate::schema`], so nothing here changes when either is tuned.
//!
//! There is no retry loop. Every inbound request produces exactly one
//! upstream call, and its failure is reported as-is.

use crate::config::GatewayConfig;
use crate::error::BillError;
use crate::model::BillData;
use crate::pipeline::data_uri::ImagePayload;
use crate::pipeline::postprocess::clean_model_text;
use crate::prompts::EXTRACTION_PROMPT;
use crate::provider::{ExtractionProvider, ExtractionRequest};
use crate::schema::BILL_SCHEMA;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

/// A successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The model's JSON exactly as parsed; this is what the gateway returns.
    pub value: Value,
    /// The same document, typed and validated.
    pub bill: BillData,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
}

/// Build the provider request for one image.
pub fn build_request(image: ImagePayload, config: &GatewayConfig) -> ExtractionRequest {
    ExtractionRequest {
        prompt: config
            .prompt
            .clone()
            .unwrap_or_else(|| EXTRACTION_PROMPT.to_string()),
        image,
        schema: &BILL_SCHEMA,
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
    }
}

/// Extract bill figures from one image.
///
/// ## Errors
/// - [`BillError::Upstream`]: the provider call failed
/// - [`BillError::EmptyResponse`]: the provider answered with no text
/// - [`BillError::MalformedResponse`]: the text is not JSON
/// - [`BillError::InvalidExtraction`]: the JSON is not a usable bill
pub async fn extract_bill(
    provider: &dyn ExtractionProvider,
    image: ImagePayload,
    config: &GatewayConfig,
) -> Result<Extraction, BillError> {
    let start = Instant::now();
    let request = build_request(image, config);

    info!("Calling {} for structured extraction", provider.name());
    let response = provider.generate(&request).await?;
    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(
        "{}: {} input tokens, {} output tokens, {}ms",
        provider.name(),
        response.input_tokens,
        response.output_tokens,
        duration_ms
    );

    let text = match response.text {
        Some(ref t) if !t.trim().is_empty() => t,
        _ => return Err(BillError::EmptyResponse),
    };

    let (value, bill) = parse_model_text(text)?;
    info!(
        "Extracted {} bill from '{}' with {} history months",
        bill.commodity(),
        bill.fornitore,
        bill.storico_consumi.len()
    );

    Ok(Extraction {
        value,
        bill,
        input_tokens: response.input_tokens,
        output_tokens: response.output_tokens,
        duration_ms,
    })
}

/// Parse model text into the raw JSON value and the validated bill.
pub fn parse_model_text(text: &str) -> Result<(Value, BillData), BillError> {
    let cleaned = clean_model_text(text);
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| BillError::MalformedResponse {
            detail: e.to_string(),
        })?;
    let bill = BillData::from_value(&value)?;
    Ok((value, bill))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Canned {
        text: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExtractionProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, request: &ExtractionRequest) -> Result<ProviderResponse, BillError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.temperature, 0.1);
            Ok(ProviderResponse {
                text: self.text.clone(),
                input_tokens: 1200,
                output_tokens: 300,
            })
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::builder().api_key("k").build().unwrap()
    }

    fn image() -> ImagePayload {
        ImagePayload::parse("data:image/png;base64,AAAA")
    }

    fn bill_json() -> Value {
        json!({
            "fornitore": "Hera Comm",
            "is_gas": true,
            "storico_consumi": [
                { "mese": "Gen 24", "valore": 180 },
                { "mese": "Feb 24", "valore": 150 }
            ],
            "spesa_totale_annua_stima": 1400.0
        })
    }

    #[test]
    fn request_uses_default_prompt_and_schema() {
        let req = build_request(image(), &config());
        assert_eq!(req.prompt, EXTRACTION_PROMPT);
        assert!(std::ptr::eq(req.schema, &*BILL_SCHEMA));
    }

    #[test]
    fn request_honours_prompt_override() {
        let cfg = GatewayConfig::builder()
            .api_key("k")
            .prompt("solo totale")
            .build()
            .unwrap();
        assert_eq!(build_request(image(), &cfg).prompt, "solo totale");
    }

    #[tokio::test]
    async fn success_keeps_raw_value() {
        let provider = Canned {
            text: Some(bill_json().to_string()),
            calls: AtomicUsize::new(0),
        };
        let out = extract_bill(&provider, image(), &config()).await.unwrap();
        assert_eq!(out.value, bill_json());
        assert!(out.bill.is_gas);
        assert_eq!(out.bill.storico_consumi.len(), 2);
        assert_eq!(out.input_tokens, 1200);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_text_is_empty_response() {
        for text in [None, Some(String::new()), Some("   ".to_string())] {
            let provider = Canned {
                text,
                calls: AtomicUsize::new(0),
            };
            let err = extract_bill(&provider, image(), &config()).await.unwrap_err();
            assert!(matches!(err, BillError::EmptyResponse));
        }
    }

    #[tokio::test]
    async fn malformed_json_is_reported() {
        let provider = Canned {
            text: Some("{\"fornitore\": ".into()),
            calls: AtomicUsize::new(0),
        };
        let err = extract_bill(&provider, image(), &config()).await.unwrap_err();
        assert!(matches!(err, BillError::MalformedResponse { .. }));
    }

    #[test]
    fn fenced_json_parses() {
        let text = format!("```json\n{}\n```", bill_json());
        let (value, bill) = parse_model_text(&text).unwrap();
        assert_eq!(value, bill_json());
        assert_eq!(bill.fornitore, "Hera Comm");
    }
}
