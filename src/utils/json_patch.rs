//! Byte-level patching of top-level JSON object fields
//!
//! Replaces the value of one top-level field without re-serializing the
//! document, so every other byte (key order, whitespace, unknown fields,
//! number formatting) is preserved.

use crate::utils::error::{helpers, AppResult, ErrorContext};
use serde::de::IgnoredAny;
use serde::Serialize;
use serde_json::Deserializer;

/// Set a top-level field of a JSON object to `value`.
///
/// An existing value is replaced in place (first occurrence); a missing field
/// is inserted as the first member.
pub fn set_top_level_field<T: Serialize + ?Sized>(document: &[u8], key: &str, value: &T) -> AppResult<Vec<u8>> {
    let encoded = serde_json::to_vec(value)?;

    let mut pos = skip_whitespace(document, 0);
    if document.get(pos) != Some(&b'{') {
        return Err(helpers::invalid_request("request body is not a JSON object"));
    }
    let open = pos;
    pos += 1;
    let mut has_members = false;

    loop {
        pos = skip_whitespace(document, pos);
        if document.get(pos) == Some(&b'}') && !has_members {
            break;
        }

        let (name, after_name) = parse_next::<String>(document, pos)?;
        pos = skip_whitespace(document, after_name);
        if document.get(pos) != Some(&b':') {
            return Err(helpers::invalid_request("expected ':' after object key"));
        }
        let value_start = skip_whitespace(document, pos + 1);
        let (_, value_end) = parse_next::<IgnoredAny>(document, value_start)?;
        has_members = true;

        if name == key {
            let mut patched = Vec::with_capacity(document.len() - (value_end - value_start) + encoded.len());
            patched.extend_from_slice(&document[..value_start]);
            patched.extend_from_slice(&encoded);
            patched.extend_from_slice(&document[value_end..]);
            return Ok(patched);
        }

        pos = skip_whitespace(document, value_end);
        match document.get(pos) {
            Some(b',') => pos += 1,
            Some(b'}') => break,
            _ => return Err(helpers::invalid_request("unterminated JSON object")),
        }
    }

    let mut member = Vec::with_capacity(key.len() + encoded.len() + 4);
    member.extend_from_slice(&serde_json::to_vec(key)?);
    member.push(b':');
    member.extend_from_slice(&encoded);
    if has_members {
        member.push(b',');
    }

    let mut patched = Vec::with_capacity(document.len() + member.len());
    patched.extend_from_slice(&document[..=open]);
    patched.extend_from_slice(&member);
    patched.extend_from_slice(&document[open + 1..]);
    Ok(patched)
}

/// Deserialize the value starting at `start`, returning it and its end offset
fn parse_next<'de, T: serde::Deserialize<'de>>(document: &'de [u8], start: usize) -> AppResult<(T, usize)> {
    let mut stream = Deserializer::from_slice(&document[start..]).into_iter::<T>();
    match stream.next() {
        Some(result) => {
            let value = result.invalid_request_context("malformed JSON in request body")?;
            Ok((value, start + stream.byte_offset()))
        }
        None => Err(helpers::invalid_request("unexpected end of JSON document")),
    }
}

fn skip_whitespace(document: &[u8], mut pos: usize) -> usize {
    while matches!(document.get(pos), Some(b' ' | b'\n' | b'\r' | b'\t')) {
        pos += 1;
    }
    pos
}
