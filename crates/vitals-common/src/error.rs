//! Error types for the vitals pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, VitalsError>;

/// Main error type for the vitals pipeline
#[derive(Error, Debug)]
pub enum VitalsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Fetch error for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Upstream returned status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalidation error: {0}")]
    Invalidation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Report text did not match pattern: {pattern}")]
    PatternMismatch { pattern: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VitalsError {
    /// True for the recoverable "object does not exist yet" condition used
    /// to detect first-run state. Every other storage failure is fatal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VitalsError::NotFound(_))
    }
}

impl From<std::num::ParseIntError> for VitalsError {
    fn from(err: std::num::ParseIntError) -> Self {
        VitalsError::Parse(err.to_string())
    }
}

impl From<std::num::ParseFloatError> for VitalsError {
    fn from(err: std::num::ParseFloatError) -> Self {
        VitalsError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_recoverable() {
        let err = VitalsError::NotFound("static/data/ca/metadata.json".to_string());
        assert!(err.is_not_found());

        let err = VitalsError::Storage("access denied".to_string());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_pattern_mismatch_names_pattern() {
        let err = VitalsError::PatternMismatch {
            pattern: "coverage date range".to_string(),
        };
        assert!(err.to_string().contains("coverage date range"));
    }
}
