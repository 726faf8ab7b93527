//! Base64 data-URI helpers shared by the upload path and mask decoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DataUriError {
    #[error("invalid base64 payload: {0}")]
    BadBase64(String),
}

/// Encode raw bytes as a `data:<mime>;base64,...` URI.
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Decode a data URI, or a bare base64 string when no `base64,` marker is
/// present (mask segmentation payloads arrive without the prefix).
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, DataUriError> {
    let encoded = match payload.find("base64,") {
        Some(pos) => &payload[pos + "base64,".len()..],
        None => payload,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|err| DataUriError::BadBase64(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_data_uri() {
        let uri = encode_data_uri("image/png", b"hello");
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_base64_payload(&uri).expect("decode failed"), b"hello");
    }

    #[test]
    fn decodes_bare_base64() {
        let encoded = STANDARD.encode(b"mask bytes");
        assert_eq!(
            decode_base64_payload(&encoded).expect("decode failed"),
            b"mask bytes"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_base64_payload("data:image/png;base64,!!!").is_err());
    }
}
