//! Reversible encoding between display strings and delimiter-safe tokens.
//!
//! Button payloads are built by joining several encoded fields with
//! [`FIELD_DELIMITER`], so no token produced here may contain it. Two
//! strategies are offered:
//!
//! - [`Strategy::Structural`] substitutes the few structural characters of a
//!   constrained vocabulary (tire sizes, lamp types, pack sizes). Tokens stay
//!   short and human-readable.
//! - [`Strategy::Binary`] encodes arbitrary text as URL-safe base64 with the
//!   padding stripped.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between fields of a composed button identifier.
pub const FIELD_DELIMITER: char = ':';

/// Stand-in for `/` in structural tokens.
const SLASH_STANDIN: char = '~';
/// Stand-in for a space in structural tokens.
const SPACE_STANDIN: char = '^';

/// Errors from encoding or decoding a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("character {0:?} is not supported by the structural codec")]
    UnsupportedChar(char),
    #[error("malformed token: {0}")]
    MalformedToken(String),
}

/// Encoding strategy for one payload field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Structural,
    Binary,
}

impl Strategy {
    pub fn encode(&self, value: &str) -> Result<String, CodecError> {
        match self {
            Strategy::Structural => encode_structural(value),
            Strategy::Binary => Ok(encode_binary(value)),
        }
    }

    pub fn decode(&self, token: &str) -> Result<String, CodecError> {
        match self {
            Strategy::Structural => decode_structural(token),
            Strategy::Binary => decode_binary(token),
        }
    }
}

// =============================================================================
// Structural substitution
// =============================================================================

/// Encode a constrained-vocabulary value.
///
/// Only printable ASCII is accepted, and the input must not already contain
/// a stand-in character or the field delimiter; either would make the
/// mapping ambiguous.
pub fn encode_structural(value: &str) -> Result<String, CodecError> {
    value
        .chars()
        .map(|c| match c {
            '/' => Ok(SLASH_STANDIN),
            ' ' => Ok(SPACE_STANDIN),
            SLASH_STANDIN | SPACE_STANDIN | FIELD_DELIMITER => Err(CodecError::UnsupportedChar(c)),
            c if c.is_ascii_graphic() => Ok(c),
            c => Err(CodecError::UnsupportedChar(c)),
        })
        .collect()
}

/// Decode a structural token back to its display value.
pub fn decode_structural(token: &str) -> Result<String, CodecError> {
    token
        .chars()
        .map(|c| match c {
            SLASH_STANDIN => Ok('/'),
            SPACE_STANDIN => Ok(' '),
            '/' | ' ' | FIELD_DELIMITER => Err(CodecError::MalformedToken(token.to_string())),
            c if c.is_ascii_graphic() => Ok(c),
            _ => Err(CodecError::MalformedToken(token.to_string())),
        })
        .collect()
}

// =============================================================================
// Binary-safe
// =============================================================================

/// Encode arbitrary text as URL-safe base64 without padding.
pub fn encode_binary(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(value.as_bytes())
}

/// Decode a token produced by [`encode_binary`], restoring the stripped padding.
pub fn decode_binary(token: &str) -> Result<String, CodecError> {
    let padding = match token.len() % 4 {
        0 => 0,
        2 => 2,
        3 => 1,
        _ => return Err(CodecError::MalformedToken(token.to_string())),
    };
    let mut padded = String::with_capacity(token.len() + padding);
    padded.push_str(token);
    padded.extend(std::iter::repeat('=').take(padding));

    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|_| CodecError::MalformedToken(token.to_string()))?;
    String::from_utf8(bytes).map_err(|_| CodecError::MalformedToken(token.to_string()))
}
