//! Configuration for the gateway and the image normalizer.
//!
//! Gateway behaviour is controlled through [`GatewayConfig`], built via
//! [`GatewayConfigBuilder`] or [`GatewayConfig::from_env`]. The provider
//! credential is read once here, at process start; handlers receive the
//! resulting client through router state and never touch the environment.
//!
//! [`NormalizeOptions`] is separate because normalization runs on the
//! uploading side, which has no credential and no gateway settings.

use crate::error::BillError;
use crate::provider::ExtractionProvider;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Environment variable holding the provider credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Configuration for the extraction gateway.
///
/// # Example
/// ```rust
/// use billai::GatewayConfig;
///
/// let config = GatewayConfig::builder()
///     .api_key("test-key")
///     .temperature(0.1)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-3-pro-preview");
/// ```
#[derive(Clone)]
pub struct GatewayConfig {
    /// Provider credential. Never logged.
    pub api_key: Option<String>,

    /// Model identifier. Default: `gemini-3-pro-preview`.
    pub model: String,

    /// Provider endpoint root. Default: the public Gemini API.
    pub base_url: String,

    /// Pre-constructed provider. Takes precedence over `api_key`.
    pub provider: Option<Arc<dyn ExtractionProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Kept low so the same bill yields the same figures run after run.
    pub temperature: f32,

    /// Cap on generated tokens. Default: provider default.
    pub max_output_tokens: Option<u32>,

    /// Custom extraction prompt. If None, uses [`crate::prompts::EXTRACTION_PROMPT`].
    pub prompt: Option<String>,

    /// Per-call upstream timeout. Default: none, the call is awaited until it ends.
    pub api_timeout_secs: Option<u64>,

    /// Largest accepted request body. Default: 10 MiB.
    ///
    /// A 1600 px JPEG is well under 1 MiB once base64-encoded, but a photo
    /// that could not be normalized travels as-is.
    pub body_limit_bytes: usize,

    /// Listen address for `serve`. Default: `0.0.0.0:3000`.
    pub bind: SocketAddr,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            provider: None,
            temperature: 0.1,
            max_output_tokens: None,
            prompt: None,
            api_timeout_secs: None,
            body_limit_bytes: 10 * 1024 * 1024,
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("bind", &self.bind)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a new builder for `GatewayConfig`.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the credential and optional overrides from the environment.
    ///
    /// `GEMINI_API_KEY` is required; `BILLAI_MODEL` and `BILLAI_BIND` are not.
    pub fn from_env() -> Result<Self, BillError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BillError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: format!("{API_KEY_ENV} environment variable is not set"),
            })?;

        let mut builder = Self::builder().api_key(api_key);
        if let Ok(model) = std::env::var("BILLAI_MODEL") {
            if !model.is_empty() {
                builder = builder.model(model);
            }
        }
        if let Ok(bind) = std::env::var("BILLAI_BIND") {
            let addr = bind
                .parse()
                .map_err(|e| BillError::InvalidConfig(format!("BILLAI_BIND '{bind}': {e}")))?;
            builder = builder.bind(addr);
        }
        builder.build()
    }

    /// Whether a credential or an injected provider is present.
    pub fn has_credential(&self) -> bool {
        self.provider.is_some() || self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ExtractionProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = Some(n);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn body_limit_bytes(mut self, n: usize) -> Self {
        self.config.body_limit_bytes = n;
        self
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.bind = addr;
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// A missing credential is a configuration error: the gateway refuses to
    /// start rather than failing on the first request.
    pub fn build(self) -> Result<GatewayConfig, BillError> {
        let c = &self.config;
        if !c.has_credential() {
            return Err(BillError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: format!("Set {API_KEY_ENV} or inject a provider."),
            });
        }
        if c.model.trim().is_empty() {
            return Err(BillError::InvalidConfig("model must not be empty".into()));
        }
        if c.body_limit_bytes < 1024 {
            return Err(BillError::InvalidConfig(format!(
                "body limit must be ≥ 1024 bytes, got {}",
                c.body_limit_bytes
            )));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(BillError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        Ok(self.config)
    }
}

/// Settings for the image normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Longest edge, in pixels, after downscaling. Default: 1600.
    pub max_dimension: u32,

    /// JPEG quality, 1–100. Default: 80.
    ///
    /// Printed digits and bar-chart labels stay legible at 80 while the
    /// payload shrinks several-fold compared to the camera original.
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1600,
            jpeg_quality: 80,
        }
    }
}

impl NormalizeOptions {
    pub fn with_max_dimension(mut self, px: u32) -> Self {
        self.max_dimension = px.max(1);
        self
    }

    pub fn with_jpeg_quality(mut self, q: u8) -> Self {
        self.jpeg_quality = q.clamp(1, 100);
        self
    }
}
