//! End-to-end analysis of one bill photo: normalize, extract, record.
//!
//! [`Analyzer`] runs the uploading side of the flow. It normalizes the file
//! locally, sends it either straight to the provider (in-process) or to a
//! remote gateway, and records the outcome in an [`AnalysisSession`].

use crate::client::GatewayClient;
use crate::config::{GatewayConfig, NormalizeOptions};
use crate::error::BillError;
use crate::model::BillData;
use crate::pipeline::data_uri::ImagePayload;
use crate::pipeline::extract::extract_bill;
use crate::pipeline::normalize::{normalize_file, NormalizedImage};
use crate::provider::{resolve_provider, ExtractionProvider};
use crate::session::{AnalysisSession, SessionState};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Where extraction happens.
pub enum Backend {
    /// Call the provider from this process.
    Local {
        provider: Arc<dyn ExtractionProvider>,
        config: Arc<GatewayConfig>,
    },
    /// Post to a running gateway.
    Remote(GatewayClient),
}

impl Backend {
    pub fn local(config: GatewayConfig) -> Result<Self, BillError> {
        let provider = resolve_provider(&config)?;
        Ok(Backend::Local {
            provider,
            config: Arc::new(config),
        })
    }

    pub fn remote(base_url: impl Into<String>) -> Self {
        Backend::Remote(GatewayClient::new(base_url))
    }

    async fn extract(&self, data_uri: &str) -> Result<BillData, BillError> {
        match self {
            Backend::Local { provider, config } => {
                let payload = ImagePayload::parse(data_uri);
                extract_bill(provider.as_ref(), payload, config)
                    .await
                    .map(|e| e.bill)
            }
            Backend::Remote(client) => client.analyze(data_uri).await,
        }
    }
}

/// Normalize → extract → session, for one user at a time.
pub struct Analyzer {
    backend: Backend,
    options: NormalizeOptions,
    session: Mutex<AnalysisSession>,
}

impl Analyzer {
    pub fn new(backend: Backend, options: NormalizeOptions) -> Self {
        Self {
            backend,
            options,
            session: Mutex::new(AnalysisSession::new()),
        }
    }

    fn session(&self) -> MutexGuard<'_, AnalysisSession> {
        // A poisoned lock only means a panic mid-update; the state is still usable.
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> SessionState {
        self.session().state().clone()
    }

    pub fn reset(&self) {
        self.session().reset();
    }

    /// Analyze an image file.
    ///
    /// The caller gets the underlying error; the session only keeps the
    /// generic user message. A result that arrives after
    /// [`reset`](Self::reset) is dropped and reported as
    /// [`BillError::Superseded`].
    pub async fn analyze_file(&self, path: &Path) -> Result<Arc<BillData>, BillError> {
        let ticket = self.session().begin()?;

        let outcome = match normalize_file(path, &self.options).await {
            Ok(image) => {
                log_normalized(path, &image);
                self.backend.extract(&image.data_uri()).await
            }
            Err(e) => Err(e),
        }
        .map(Arc::new);

        let accepted = self
            .session()
            .finish(ticket, outcome.as_ref().map(Arc::clone));
        if !accepted {
            return Err(BillError::Superseded);
        }
        outcome
    }
}

fn log_normalized(path: &Path, image: &NormalizedImage) {
    match (image.original_dimensions, image.dimensions) {
        (Some((ow, oh)), Some((w, h))) => info!(
            "Normalized {}: {}x{} → {}x{}, {} → {} bytes base64",
            path.display(),
            ow,
            oh,
            w,
            h,
            image.original_len,
            image.payload.data.len()
        ),
        _ => info!(
            "Forwarding {} unmodified ({}, {} bytes)",
            path.display(),
            image.payload.mime_type,
            image.original_len
        ),
    }
}
