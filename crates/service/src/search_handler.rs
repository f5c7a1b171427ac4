use std::sync::Arc;
use std::time::Instant;

use encoder::Encoder;
use ipc::{
    ErrorReply, ReloadResponse, Reply, Request, SearchHit, SearchRequest, SearchResponse,
};
use tracing::{info, warn};

use crate::bootstrap::ServiceState;
use crate::status::{host_label, make_status_response};

/// Executes decoded IPC requests. Implementations may block; the server
/// calls them from tokio's blocking pool.
pub trait SearchHandler: Send + Sync {
    fn handle(&self, req: Request) -> Reply;
}

/// Default handler backed by the retrieval engine.
pub struct EngineSearchHandler {
    state: Arc<ServiceState>,
}

impl EngineSearchHandler {
    pub const fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }

    fn search(&self, req: SearchRequest) -> Reply {
        let started = Instant::now();
        let engine = self.state.engine();
        let result = match req.limit {
            Some(limit) => engine.search(&req.query, limit as usize),
            None => engine.search_default(&req.query),
        };
        match result {
            Ok(results) => {
                let hits: Vec<SearchHit> = results.into_iter().map(SearchHit::from).collect();
                let took_ms = u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX);
                Reply::Search(SearchResponse {
                    id: req.id,
                    total: hits.len() as u64,
                    hits,
                    took_ms,
                    served_by: Some(host_label()),
                })
            }
            Err(err) => {
                warn!(request = %req.id, kind = err.kind().as_str(), error = %err, "search failed");
                Reply::Error(ErrorReply::from_search_error(req.id, &err))
            }
        }
    }
}

impl SearchHandler for EngineSearchHandler {
    fn handle(&self, req: Request) -> Reply {
        match req {
            Request::Search(req) => self.search(req),
            Request::Status(req) => Reply::Status(make_status_response(
                req.id,
                self.state.index(),
                self.state.engine().encoder().cache_stats(),
            )),
            Request::Reload(req) => match self.state.reload() {
                Ok(outcome) => {
                    info!(
                        documents = outcome.documents,
                        generation = outcome.generation,
                        "index reloaded"
                    );
                    Reply::Reloaded(ReloadResponse {
                        id: req.id,
                        documents: outcome.documents,
                        index_generation: outcome.generation,
                    })
                }
                Err(err) => {
                    warn!(error = %err, "index reload failed; keeping current snapshot");
                    Reply::Error(ErrorReply::from_search_error(req.id, &err))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::config::AppConfig;
    use core_types::{DistanceMetric, Document};
    use encoder::{Encoder, HashingEncoder};
    use ipc::{ErrorCode, StatusRequest};
    use retrieval::RetrievalEngine;
    use semantic_index::{IndexBuilder, IndexHandle, VectorIndex};
    use uuid::Uuid;

    fn handler() -> EngineSearchHandler {
        let encoder = HashingEncoder::new(32).unwrap();
        let mut b = IndexBuilder::new(32, DistanceMetric::Cosine).unwrap();
        for (id, text) in [("a", "may the force be with you"), ("b", "i am your father")] {
            b.add(Document::new(id, text, encoder.encode(text).unwrap()))
                .unwrap();
        }
        let handle = Arc::new(IndexHandle::new(Arc::new(b.build())));
        let engine = RetrievalEngine::new(
            Arc::new(encoder),
            Arc::clone(&handle) as Arc<dyn VectorIndex>,
        )
        .unwrap();
        EngineSearchHandler::new(Arc::new(ServiceState::new(
            engine,
            handle,
            AppConfig::default(),
        )))
    }

    #[test]
    fn search_maps_results_in_rank_order() {
        let reply = handler().handle(Request::Search(SearchRequest::new("your father", Some(2))));
        let Reply::Search(resp) = reply else {
            panic!("expected search reply, got {reply:?}");
        };
        assert_eq!(resp.total, 2);
        assert_eq!(resp.hits[0].doc_id, "b");
        assert!(resp.hits[0].distance <= resp.hits[1].distance);
    }

    #[test]
    fn blank_query_becomes_error_reply() {
        let req = SearchRequest::new("   ", None);
        let id = req.id;
        let reply = handler().handle(Request::Search(req));
        let Reply::Error(err) = reply else {
            panic!("expected error reply, got {reply:?}");
        };
        assert_eq!(err.id, id);
        assert_eq!(err.code, ErrorCode::InvalidQuery);
        assert!(!err.retryable);
    }

    #[test]
    fn status_reports_document_count() {
        let reply = handler().handle(Request::Status(StatusRequest { id: Uuid::nil() }));
        let Reply::Status(status) = reply else {
            panic!("expected status reply, got {reply:?}");
        };
        assert_eq!(status.documents, 2);
        assert_eq!(status.dimension, 32);
    }
}
