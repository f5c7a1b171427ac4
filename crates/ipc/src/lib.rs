//! IPC protocol models for SubSearch.
//!
//! Requests and replies are serialized with bincode and carried in
//! length-prefixed frames (see [`framing`]) over a local TCP socket. The
//! types mirror the engine's result records without pulling in index or
//! encoder dependencies.

pub mod client;
pub mod framing;

use core_types::{ErrorKind, Metadata, ScoredResult, SearchError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use client::{ServiceError, TcpClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub id: Uuid,
    pub query: String,
    /// `None` lets the service apply its default `k`.
    pub limit: Option<u32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub distance: f32,
    pub text: String,
    pub metadata: Metadata,
}

impl From<ScoredResult> for SearchHit {
    fn from(value: ScoredResult) -> Self {
        Self {
            doc_id: value.document_id.0,
            distance: value.distance,
            text: value.text,
            metadata: value.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub id: Uuid,
    /// Ascending by distance.
    pub hits: Vec<SearchHit>,
    pub total: u64,
    pub took_ms: u32,
    pub served_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub id: Uuid,
    pub documents: u64,
    pub dimension: u32,
    pub metric: String,
    pub model_id: String,
    pub index_generation: u64,
    /// Query-vector cache counters; both zero when caching is disabled.
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub served_by: Option<String>,
}

/// Error kinds as they cross the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidQuery,
    Encoding,
    DimensionMismatch,
    IndexUnavailable,
    Timeout,
    BadRequest,
    Internal,
}

impl From<ErrorKind> for ErrorCode {
    fn from(value: ErrorKind) -> Self {
        match value {
            ErrorKind::InvalidQuery => Self::InvalidQuery,
            ErrorKind::Encoding => Self::Encoding,
            ErrorKind::DimensionMismatch => Self::DimensionMismatch,
            ErrorKind::IndexUnavailable => Self::IndexUnavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub id: Uuid,
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl ErrorReply {
    pub fn from_search_error(id: Uuid, err: &SearchError) -> Self {
        Self {
            id,
            code: err.kind().into(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadRequest {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub id: Uuid,
    pub documents: u64,
    pub index_generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Search(SearchRequest),
    Status(StatusRequest),
    Reload(ReloadRequest),
}

impl Request {
    pub const fn id(&self) -> Uuid {
        match self {
            Self::Search(r) => r.id,
            Self::Status(r) => r.id,
            Self::Reload(r) => r.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Search(SearchResponse),
    Status(StatusResponse),
    Reloaded(ReloadResponse),
    Error(ErrorReply),
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{DocumentId, MetadataValue};

    #[test]
    fn bincode_request_and_reply() {
        let req = Request::Search(SearchRequest::new("I'll be back", Some(5)));
        let bytes = bincode::serialize(&req).expect("serialize");
        let back: Request = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(back, req);

        let mut metadata = Metadata::new();
        metadata.insert("movie".into(), MetadataValue::from("The Terminator"));
        metadata.insert("timestamp_ms".into(), MetadataValue::Int(5_130_000));
        let hit = SearchHit::from(ScoredResult {
            document_id: DocumentId::new("t1-0917"),
            distance: 0.12,
            metadata,
            text: "I'll be back.".into(),
        });
        let reply = Reply::Search(SearchResponse {
            id: req.id(),
            hits: vec![hit],
            total: 1,
            took_ms: 3,
            served_by: Some("test".into()),
        });
        let bytes = bincode::serialize(&reply).expect("serialize");
        let back: Reply = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(back, reply);
    }

    #[test]
    fn error_reply_carries_kind_and_retryability() {
        let id = Uuid::nil();
        let reply = ErrorReply::from_search_error(id, &SearchError::encoding("gpu oom"));
        assert_eq!(reply.code, ErrorCode::Encoding);
        assert!(reply.retryable);
        assert_eq!(reply.message, "encoding failed: gpu oom");
    }
}
