//! # billai
//!
//! Read an Italian electricity or gas bill from a photo and turn it into
//! structured, comparable data.
//!
//! A vision model (Gemini) is asked to fill a fixed JSON schema: supplier,
//! billing period, unit costs, annual consumption split by time band, and a
//! month-by-month history. The crate wraps that call in a small HTTP gateway
//! so the API key never leaves the server, and provides the client-side
//! pieces around it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo
//!  │
//!  ├─ 1. Normalize  downscale to 1600 px, re-encode JPEG q80 (spawn_blocking)
//!  ├─ 2. Encode     data URI → { mime_type, base64 }
//!  ├─ 3. Extract    one schema-constrained call to the model
//!  ├─ 4. Parse      strip fences, JSON → BillData, validate
//!  └─ 5. Record     session state + optional CSV report
//! ```
//!
//! ## Quick Start
//!
//! Run the gateway:
//!
//! ```rust,no_run
//! use billai::{serve, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Needs GEMINI_API_KEY in the environment.
//!     let config = GatewayConfig::from_env()?;
//!     serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! Analyze a photo against a running gateway:
//!
//! ```rust,no_run
//! use billai::{to_csv, Analyzer, Backend, NormalizeOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analyzer = Analyzer::new(
//!         Backend::remote("http://localhost:3000"),
//!         NormalizeOptions::default(),
//!     );
//!     let bill = analyzer.analyze_file(Path::new("bolletta.jpg")).await?;
//!     println!("{} ({})", bill.fornitore, bill.commodity());
//!     print!("{}", to_csv(&bill)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `billai` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! billai = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyzer;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod schema;
pub mod server;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyzer::{Analyzer, Backend};
pub use client::GatewayClient;
pub use config::{GatewayConfig, GatewayConfigBuilder, NormalizeOptions};
pub use error::BillError;
pub use export::{export_filename, to_csv, write_csv, write_csv_to};
pub use model::{BillData, Commodity, ConsumptionByBand, HistoryItem};
pub use pipeline::data_uri::ImagePayload;
pub use pipeline::extract::{extract_bill, Extraction};
pub use pipeline::normalize::{normalize_bytes, normalize_file, NormalizedImage};
pub use provider::{ExtractionProvider, ExtractionRequest, GeminiProvider, ProviderResponse};
pub use schema::{Schema, BILL_SCHEMA};
pub use server::{router, run, serve, AppState, HealthReport};
pub use session::{AnalysisSession, SessionState, Ticket};
