//! The seam between the gateway and the generative model.
//!
//! [`ExtractionProvider`] is the one call the gateway makes per request:
//! prompt + image + schema in, model text out. The production implementation
//! is [`gemini::GeminiProvider`]; tests inject stubs through
//! [`crate::config::GatewayConfig::provider`].
//!
//! A provider reports an answer with no text as `Ok` with `text: None` rather
//! than as an error: the gateway surfaces that case with its own status.

pub mod gemini;

use crate::config::GatewayConfig;
use crate::error::BillError;
use crate::pipeline::data_uri::ImagePayload;
use crate::schema::Schema;
use async_trait::async_trait;
use std::sync::Arc;

pub use gemini::GeminiProvider;

/// One structured-extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub prompt: String,
    pub image: ImagePayload,
    pub schema: &'static Schema,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

/// What came back from the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderResponse {
    /// Concatenated answer text; `None` when the model produced none.
    pub text: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A generative model able to answer under a response schema.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Issue exactly one request. Implementations must not retry.
    async fn generate(&self, request: &ExtractionRequest) -> Result<ProviderResponse, BillError>;
}

/// Resolve the provider for a gateway: an injected one, else Gemini built
/// from the configured credential.
pub fn resolve_provider(config: &GatewayConfig) -> Result<Arc<dyn ExtractionProvider>, BillError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    Ok(Arc::new(GeminiProvider::from_config(config)?))
}
