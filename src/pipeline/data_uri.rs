//! Data-URI handling: `data:<mime>;base64,<payload>`.
//!
//! The uploader produces data URIs; the provider wants the MIME type and the
//! base64 payload as separate fields. A string without the `data:` prefix is
//! accepted as a bare base64 payload and assumed to be JPEG, which is what
//! the normalizer emits.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

/// MIME type assumed for bare base64 payloads.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

static RE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:([^;]+);base64,(.+)$").unwrap());

/// An image ready to be attached to a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64 body, without the `data:` header.
    pub data: String,
}

impl ImagePayload {
    /// Split a data URI, or take the whole string as a base64 payload.
    pub fn parse(input: &str) -> Self {
        match RE_DATA_URI.captures(input) {
            Some(caps) => Self {
                mime_type: caps[1].to_string(),
                data: caps[2].to_string(),
            },
            None => Self {
                mime_type: DEFAULT_MIME_TYPE.to_string(),
                data: input.to_string(),
            },
        }
    }

    /// Encode raw bytes.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Render back to `data:<mime>;base64,<payload>`.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_data_uri() {
        let p = ImagePayload::parse("data:image/png;base64,AAAA");
        assert_eq!(p.mime_type, "image/png");
        assert_eq!(p.data, "AAAA");
    }

    #[test]
    fn bare_payload_defaults_to_jpeg() {
        let p = ImagePayload::parse("/9j/4AAQSkZJRg==");
        assert_eq!(p.mime_type, "image/jpeg");
        assert_eq!(p.data, "/9j/4AAQSkZJRg==");
    }

    #[test]
    fn non_base64_data_uri_is_treated_as_payload() {
        // URL-encoded data URIs are not split; the whole string is forwarded.
        let input = "data:image/svg+xml,%3Csvg%3E";
        let p = ImagePayload::parse(input);
        assert_eq!(p.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(p.data, input);
    }

    #[test]
    fn from_bytes_renders_uri() {
        let p = ImagePayload::from_bytes(b"hi", "image/webp");
        assert_eq!(p.to_data_uri(), "data:image/webp;base64,aGk=");
        assert_eq!(ImagePayload::parse(&p.to_data_uri()), p);
    }
}
