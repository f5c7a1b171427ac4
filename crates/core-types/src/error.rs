use thiserror::Error;

/// Failure taxonomy surfaced by every stage of a search request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// Empty or malformed query; the caller should ask for new input.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// The encoder could not produce a vector.
    #[error("encoding failed: {0}")]
    Encoding(String),
    /// Encoder and index disagree on vector width.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Index storage is missing, unreadable or corrupt.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
}

/// Coarse error kind, stable across the IPC boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidQuery,
    Encoding,
    DimensionMismatch,
    IndexUnavailable,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidQuery => "invalid_query",
            Self::Encoding => "encoding",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::IndexUnavailable => "index_unavailable",
        }
    }
}

impl SearchError {
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::IndexUnavailable(msg.into())
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::IndexUnavailable(_) => ErrorKind::IndexUnavailable,
        }
    }

    /// Whether retrying the same request may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Encoding(_) | Self::IndexUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_retryability() {
        let err = SearchError::DimensionMismatch {
            expected: 768,
            actual: 384,
        };
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "dimension mismatch: expected 768, got 384");

        assert!(SearchError::encoding("oom").is_retryable());
        assert!(SearchError::unavailable("gone").is_retryable());
        assert!(!SearchError::invalid_query("empty").is_retryable());
    }
}
