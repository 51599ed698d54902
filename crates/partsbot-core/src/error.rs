use thiserror::Error;

/// Top-level error type for the partsbot workspace.
///
/// Covers the ambient concerns shared by every crate (configuration, file
/// I/O, serialization, catalog loading). The chat engine defines its own
/// `ChatError` and converts from this type where the two meet.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PartsbotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Payload too large: {size} bytes exceeds {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl From<toml::de::Error> for PartsbotError {
    fn from(err: toml::de::Error) -> Self {
        PartsbotError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PartsbotError {
    fn from(err: serde_json::Error) -> Self {
        PartsbotError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for partsbot operations.
pub type Result<T> = std::result::Result<T, PartsbotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PartsbotError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = PartsbotError::Catalog("no rows".to_string());
        assert_eq!(err.to_string(), "Catalog error: no rows");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PartsbotError = io_err.into();
        assert!(matches!(err, PartsbotError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PartsbotError = json_err.into();
        assert!(matches!(err, PartsbotError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("this is {{ not toml").unwrap_err();
        let err: PartsbotError = toml_err.into();
        assert!(matches!(err, PartsbotError::Config(_)));
    }

    #[test]
    fn test_payload_too_large_display() {
        let err = PartsbotError::PayloadTooLarge {
            size: 1200,
            limit: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Payload too large: 1200 bytes exceeds 1000 bytes"
        );
    }
}
