//! Embedding vector codec
//!
//! Backends return each vector either as a JSON array of numbers or, when the
//! client asked for `encoding_format: "base64"`, as base64 of packed
//! little-endian f64 values. The representation is chosen from the request's
//! format, never by sniffing the JSON value.

use crate::models::openai::EncodingFormat;
use crate::utils::error::{helpers, AppResult, ErrorContext};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::value::RawValue;

const F64_WIDTH: usize = std::mem::size_of::<f64>();

/// One embedding as it appeared on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingPayload {
    Float(Vec<f64>),
    Base64(String),
}

impl EmbeddingPayload {
    /// Interpret a raw JSON value according to the requested format
    pub fn from_raw(raw: &RawValue, format: EncodingFormat) -> AppResult<Self> {
        match format {
            EncodingFormat::Float => serde_json::from_str::<Vec<f64>>(raw.get())
                .map(EmbeddingPayload::Float)
                .invalid_response_context("embedding is not a number array"),
            EncodingFormat::Base64 => serde_json::from_str::<String>(raw.get())
                .map(EmbeddingPayload::Base64)
                .invalid_response_context("embedding is not a base64 string"),
        }
    }

    /// Decode to the numeric vector
    pub fn decode(self) -> AppResult<Vec<f64>> {
        match self {
            EmbeddingPayload::Float(values) => Ok(values),
            EmbeddingPayload::Base64(encoded) => decode_base64(&encoded),
        }
    }
}

/// Decode base64 of packed little-endian f64 values
pub fn decode_base64(encoded: &str) -> AppResult<Vec<f64>> {
    let bytes = BASE64
        .decode(encoded)
        .invalid_response_context("invalid base64 embedding")?;

    if bytes.len() % F64_WIDTH != 0 {
        return Err(helpers::invalid_response(format!(
            "base64 embedding length {} is not a multiple of {}",
            bytes.len(),
            F64_WIDTH
        )));
    }

    Ok(bytes
        .chunks_exact(F64_WIDTH)
        .map(|chunk| {
            let mut word = [0u8; F64_WIDTH];
            word.copy_from_slice(chunk);
            f64::from_le_bytes(word)
        })
        .collect())
}

/// Encode values as base64 of packed little-endian f64 values
pub fn encode_base64(values: &[f64]) -> String {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).unwrap()
    }

    #[test]
    fn test_array_and_base64_decode_identically() {
        let values = vec![0.1, -2.5, 3.0e-8, 42.0];
        let array = EmbeddingPayload::from_raw(&raw("[0.1,-2.5,3.0e-8,42.0]"), EncodingFormat::Float)
            .unwrap()
            .decode()
            .unwrap();

        let encoded = format!("\"{}\"", encode_base64(&values));
        let packed = EmbeddingPayload::from_raw(&raw(&encoded), EncodingFormat::Base64)
            .unwrap()
            .decode()
            .unwrap();

        assert_eq!(array, values);
        assert_eq!(packed, values);
    }

    #[test]
    fn test_format_is_not_sniffed() {
        assert!(EmbeddingPayload::from_raw(&raw("[1.0]"), EncodingFormat::Base64).is_err());
        assert!(EmbeddingPayload::from_raw(&raw("\"AAAAAAAA8D8=\""), EncodingFormat::Float).is_err());
    }

    #[test]
    fn test_base64_length_must_be_word_aligned() {
        // 4 bytes
        let err = decode_base64("AAAAAA==").unwrap_err();
        assert!(err.to_string().contains("not a multiple of 8"));

        assert!(decode_base64("not base64!").is_err());
        assert_eq!(decode_base64("").unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn test_known_encoding() {
        // 1.0 as little-endian f64
        assert_eq!(decode_base64("AAAAAAAA8D8=").unwrap(), vec![1.0]);
        assert_eq!(encode_base64(&[1.0]), "AAAAAAAA8D8=");
    }
}
