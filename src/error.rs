//! Error types for the billai library.
//!
//! A single fatal error type, [`BillError`], covers every stage that can stop
//! an analysis: reading the upload, the provider call, parsing and validating
//! the model output, talking to a remote gateway, and configuration.
//!
//! The image normalizer is deliberately absent from this list. A photo that
//! cannot be decoded or re-encoded is forwarded unchanged, so normalization
//! never fails an upload on its own.
//!
//! The HTTP status each variant maps to lives in [`crate::server`], next to
//! the handler that produces it.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the billai library.
#[derive(Debug, Error)]
pub enum BillError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Bill image not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The request carried no image, or an empty one.
    #[error("Missing image in request body")]
    MissingImage,

    // ── Provider errors ───────────────────────────────────────────────────
    /// The provider credential is not available.
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The provider call failed: transport error or a non-2xx answer.
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// The provider answered but produced no text at all.
    #[error("AI response empty")]
    EmptyResponse,

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The model text is not valid JSON.
    #[error("Malformed model output: {detail}")]
    MalformedResponse { detail: String },

    /// The JSON parsed but does not describe a usable bill.
    #[error("Extraction does not match the bill schema: {detail}")]
    InvalidExtraction { detail: String },

    // ── Gateway errors ────────────────────────────────────────────────────
    /// A remote gateway answered with a non-2xx status.
    #[error("Server error: {status} {message}")]
    Gateway { status: u16, message: String },

    /// A new analysis was started while another one is still outstanding.
    #[error("An analysis is already in progress")]
    SessionBusy,

    /// The session was reset while this analysis was in flight.
    #[error("Analysis was reset before it finished; result discarded")]
    Superseded,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The output schema and the BillData type disagree.
    #[error("Output schema out of sync with BillData: {0}")]
    SchemaMismatch(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not bind the gateway listener.
    #[error("Failed to bind '{addr}': {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not write an export file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillError {
    /// True when the failure happened on the provider side rather than in
    /// the request or in this process.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            BillError::Upstream { .. }
                | BillError::EmptyResponse
                | BillError::MalformedResponse { .. }
                | BillError::InvalidExtraction { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_display() {
        let e = BillError::Gateway {
            status: 502,
            message: "AI response empty".into(),
        };
        assert_eq!(e.to_string(), "Server error: 502 AI response empty");
    }

    #[test]
    fn malformed_keeps_parser_detail() {
        let e = BillError::MalformedResponse {
            detail: "expected value at line 1 column 1".into(),
        };
        assert!(e.to_string().contains("line 1 column 1"));
    }

    #[test]
    fn provider_not_configured_display() {
        let e = BillError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "Set GEMINI_API_KEY".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("gemini"));
        assert!(msg.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn upstream_classification() {
        assert!(BillError::EmptyResponse.is_upstream());
        assert!(!BillError::MissingImage.is_upstream());
        assert!(!BillError::SessionBusy.is_upstream());
    }
}
