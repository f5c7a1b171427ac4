use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ipc::framing::{read_frame, write_frame};
use ipc::{ErrorCode, ErrorReply, Reply, Request};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::search_handler::SearchHandler;

/// Accept connections until `shutdown` resolves, spawning a task per
/// connection. In-flight connections are left to finish on their own.
pub async fn serve<F>(
    listener: TcpListener,
    handler: Arc<dyn SearchHandler>,
    request_timeout: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    info!(addr = %listener.local_addr()?, "listening");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown requested; no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (conn, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };
                debug!(%peer, "connection accepted");
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(conn, handler, request_timeout).await {
                        warn!(%peer, "connection error: {e:?}");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    mut conn: TcpStream,
    handler: Arc<dyn SearchHandler>,
    request_timeout: Duration,
) -> Result<()> {
    while let Some(payload) = read_frame(&mut conn).await? {
        let reply = dispatch(&payload, Arc::clone(&handler), request_timeout).await;
        let encoded = bincode::serialize(&reply)?;
        write_frame(&mut conn, &encoded).await?;
    }
    Ok(())
}

/// Decode one request payload and run it on the blocking pool. Always
/// produces a reply.
///
/// Searches and status queries are bounded by `request_timeout`. A reload runs
/// to completion: an abandoned reload would still swap the index afterwards,
/// so timing it out would misreport the outcome.
pub async fn dispatch(
    payload: &[u8],
    handler: Arc<dyn SearchHandler>,
    request_timeout: Duration,
) -> Reply {
    let req: Request = match bincode::deserialize(payload) {
        Ok(req) => req,
        Err(e) => {
            warn!("undecodable request ({} bytes): {e}", payload.len());
            return error_reply(Uuid::nil(), ErrorCode::BadRequest, format!("bad request: {e}"), false);
        }
    };
    let id = req.id();
    let bounded = !matches!(req, Request::Reload(_));

    let task = tokio::task::spawn_blocking(move || handler.handle(req));
    let joined = if bounded {
        tokio::time::timeout(request_timeout, task).await
    } else {
        Ok(task.await)
    };
    match joined {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            warn!(request = %id, "handler task failed: {e}");
            error_reply(id, ErrorCode::Internal, "request handler failed".into(), false)
        }
        Err(_) => {
            warn!(request = %id, timeout_ms = request_timeout.as_millis() as u64, "request timed out");
            error_reply(
                id,
                ErrorCode::Timeout,
                format!("request exceeded {} ms", request_timeout.as_millis()),
                true,
            )
        }
    }
}

fn error_reply(id: Uuid, code: ErrorCode, message: String, retryable: bool) -> Reply {
    Reply::Error(ErrorReply {
        id,
        code,
        message,
        retryable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipc::{ReloadRequest, SearchRequest, SearchResponse, StatusRequest};

    struct SlowHandler(Duration);

    impl SearchHandler for SlowHandler {
        fn handle(&self, req: Request) -> Reply {
            std::thread::sleep(self.0);
            Reply::Search(SearchResponse {
                id: req.id(),
                hits: Vec::new(),
                total: 0,
                took_ms: 0,
                served_by: None,
            })
        }
    }

    #[tokio::test]
    async fn garbage_payload_is_bad_request() {
        let handler: Arc<dyn SearchHandler> = Arc::new(SlowHandler(Duration::ZERO));
        let reply = dispatch(&[0xff, 0xff, 0xff], handler, Duration::from_secs(1)).await;
        let Reply::Error(err) = reply else {
            panic!("expected error reply, got {reply:?}");
        };
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn reply_echoes_request_id() {
        let handler: Arc<dyn SearchHandler> = Arc::new(SlowHandler(Duration::ZERO));
        let req = Request::Status(StatusRequest { id: Uuid::new_v4() });
        let payload = bincode::serialize(&req).unwrap();
        let reply = dispatch(&payload, handler, Duration::from_secs(1)).await;
        let Reply::Search(resp) = reply else {
            panic!("expected search reply, got {reply:?}");
        };
        assert_eq!(resp.id, req.id());
    }

    #[tokio::test]
    async fn slow_handler_times_out_as_retryable() {
        let handler: Arc<dyn SearchHandler> = Arc::new(SlowHandler(Duration::from_millis(300)));
        let req = Request::Search(SearchRequest::new("hasta la vista", Some(3)));
        let payload = bincode::serialize(&req).unwrap();
        let reply = dispatch(&payload, handler, Duration::from_millis(20)).await;
        let Reply::Error(err) = reply else {
            panic!("expected error reply, got {reply:?}");
        };
        assert_eq!(err.id, req.id());
        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn slow_reload_is_not_cut_off_by_the_search_timeout() {
        let handler: Arc<dyn SearchHandler> = Arc::new(SlowHandler(Duration::from_millis(150)));
        let req = Request::Reload(ReloadRequest { id: Uuid::new_v4() });
        let payload = bincode::serialize(&req).unwrap();
        let reply = dispatch(&payload, handler, Duration::from_millis(20)).await;
        match reply {
            Reply::Search(resp) => assert_eq!(resp.id, req.id()),
            other => panic!("reload must run to completion, got {other:?}"),
        }
    }
}
