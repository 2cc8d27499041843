//! Post-processing: deterministic cleanup of model text before JSON parsing.
//!
//! With `responseMimeType: application/json` the provider normally returns a
//! bare JSON document, but models still occasionally
//!
//! - wrap the document in a ```` ```json ```` fence,
//! - prefix it with a byte-order mark or zero-width characters,
//! - pad it with blank lines.
//!
//! None of these change the content, and all of them make `serde_json` fail.
//! The rules below remove them and nothing else: a document that is still
//! invalid afterwards is reported as malformed, never repaired.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw model text.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (BOM, zero-width spaces and joiners)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip an outer code fence (with or without a `json` tag)
/// 4. Trim surrounding whitespace
pub fn clean_model_text(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_code_fences(&s);
    s.trim().to_string()
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
