//! Error types for the session engine.

use partsbot_core::error::PartsbotError;

use crate::catalog::CatalogError;
use crate::codec::CodecError;
use crate::nlu::NluError;
use crate::payload::PayloadError;

/// Errors from the session engine.
///
/// Only [`ChatError::SessionCorruption`] ends a session; every other kind
/// is recovered inside the flow with a prompt or a fallback.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("value {value} out of range {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
    #[error("external service error: {0}")]
    ExternalService(String),
    #[error("cached result set {0} no longer available")]
    CacheMiss(uuid::Uuid),
    #[error("session corrupted: {0}")]
    SessionCorruption(String),
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Whether the session must be reset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::SessionCorruption(_))
    }
}

impl From<CatalogError> for ChatError {
    fn from(err: CatalogError) -> Self {
        ChatError::ExternalService(err.to_string())
    }
}

impl From<NluError> for ChatError {
    fn from(err: NluError) -> Self {
        ChatError::ExternalService(err.to_string())
    }
}

impl From<CodecError> for ChatError {
    fn from(err: CodecError) -> Self {
        ChatError::Payload(PayloadError::Codec(err))
    }
}

impl From<PartsbotError> for ChatError {
    fn from(err: PartsbotError) -> Self {
        match err {
            PartsbotError::PayloadTooLarge { .. } => ChatError::Parse(err.to_string()),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
