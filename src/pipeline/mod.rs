//! Pipeline stages from an uploaded photo to validated bill figures.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without the others.
//!
//! ## Data Flow
//!
//! ```text
//! normalize ──▶ data_uri ──▶ extract ──▶ postprocess
//!  (resize,      (split       (one         (clean text,
//!   JPEG)         mime/b64)    model call)  then parse)
//! ```
//!
//! 1. [`normalize`]: downscale and re-encode the upload; falls back to the
//!    original bytes rather than failing. Runs on the uploading side.
//! 2. [`data_uri`]: build and split `data:<mime>;base64,<payload>` strings
//! 3. [`extract`]: the single provider call, plus JSON parse and schema
//!    validation; the only stage with network I/O
//! 4. [`postprocess`]: deterministic cleanup of model text before parsing

pub mod data_uri;
pub mod extract;
pub mod normalize;
pub mod postprocess;
