//! Error types for the Topograph core library.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the event store, row decoding, and configuration domains.

/// Top-level error type for the Topograph core library.
#[derive(Debug, thiserror::Error)]
pub enum TopographError {
    #[error("Event store error: {0}")]
    Store(#[from] StoreError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors from the time-series event store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Event store unreachable: {message}")]
    Unreachable { message: String },

    #[error("Query rejected by event store: {message}")]
    QueryRejected { message: String },

    #[error("Query timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Event store returned no results for query: {query}")]
    EmptyResponse { query: String },

    #[error("Invalid response from event store: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid event store URL: {url}")]
    InvalidUrl { url: String },
}

/// Errors raised while turning loosely-typed rows into typed events.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed timestamp '{value}': {message}")]
    MalformedTimestamp { value: String, message: String },

    #[error("Column {column} holds an unexpected value, expected {expected}")]
    UnexpectedCellType { column: usize, expected: &'static str },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `TopographError`.
pub type Result<T> = std::result::Result<T, TopographError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_store() {
        let err = TopographError::Store(StoreError::Unreachable {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "Event store error: Event store unreachable: connection refused"
        );
    }

    #[test]
    fn test_error_display_decode() {
        let err = TopographError::Decode(DecodeError::MalformedTimestamp {
            value: "yesterday".into(),
            message: "input contains invalid characters".into(),
        });
        assert_eq!(
            err.to_string(),
            "Decode error: Malformed timestamp 'yesterday': input contains invalid characters"
        );
    }

    #[test]
    fn test_error_display_empty_response() {
        let err = StoreError::EmptyResponse {
            query: "SELECT * FROM FlowEvents".into(),
        };
        assert_eq!(
            err.to_string(),
            "Event store returned no results for query: SELECT * FROM FlowEvents"
        );
    }

    #[test]
    fn test_decode_error_variants() {
        let err = DecodeError::UnexpectedCellType {
            column: 6,
            expected: "string",
        };
        assert_eq!(
            err.to_string(),
            "Column 6 holds an unexpected value, expected string"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TopographError = io_err.into();
        assert!(matches!(err, TopographError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: TopographError = serde_err.into();
        assert!(matches!(err, TopographError::Serialization(_)));
    }
}
