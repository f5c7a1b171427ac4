use anyhow::{Context, Result, anyhow, bail};
use tokio::net::TcpStream;
use tokio::time::{Duration, sleep};
use tracing::warn;
use uuid::Uuid;

use crate::framing::{read_frame, write_frame};
use crate::{
    ErrorReply, ReloadRequest, ReloadResponse, Reply, Request, SearchRequest, SearchResponse,
    StatusRequest, StatusResponse,
};

pub const DEFAULT_ADDR: &str = "127.0.0.1:7878";
const DEFAULT_TIMEOUT_MS: u64 = 2_500;
const RELOAD_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_RETRIES: u32 = 2;
const BACKOFF_MS: u64 = 50;

/// TCP IPC client for the SubSearch service.
///
/// Search and status transport failures are retried with linear backoff;
/// error replies from the service are returned immediately (retrying them is
/// the caller's call, see [`ErrorReply::retryable`]). Reloads are sent once.
#[derive(Debug, Clone)]
pub struct TcpClient {
    addr: String,
    request_timeout: Duration,
    retries: u32,
}

impl Default for TcpClient {
    fn default() -> Self {
        Self::new(DEFAULT_ADDR)
    }
}

/// Error reply from the service, surfaced through `anyhow` so callers can
/// downcast and inspect the code.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{:?}: {}", .0.code, .0.message)]
pub struct ServiceError(pub ErrorReply);

impl TcpClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retries: DEFAULT_RETRIES,
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
        match self.request(Request::Search(req), self.request_timeout, self.retries).await? {
            Reply::Search(resp) => Ok(resp),
            other => bail!("unexpected reply to search: {other:?}"),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let req = Request::Status(StatusRequest { id: Uuid::new_v4() });
        match self.request(req, self.request_timeout, self.retries).await? {
            Reply::Status(resp) => Ok(resp),
            other => bail!("unexpected reply to status: {other:?}"),
        }
    }

    /// Ask the service to swap in the snapshot on disk. Sent exactly once: a
    /// reload whose reply was lost may still have taken effect.
    pub async fn reload(&self) -> Result<ReloadResponse> {
        let req = Request::Reload(ReloadRequest { id: Uuid::new_v4() });
        let timeout = self.request_timeout.max(Duration::from_millis(RELOAD_TIMEOUT_MS));
        match self.request(req, timeout, 0).await? {
            Reply::Reloaded(resp) => Ok(resp),
            other => bail!("unexpected reply to reload: {other:?}"),
        }
    }

    async fn round_trip(&self, payload: &[u8]) -> Result<Reply> {
        let mut conn = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("connect to {}", self.addr))?;
        write_frame(&mut conn, payload).await?;
        let frame = read_frame(&mut conn)
            .await?
            .ok_or_else(|| anyhow!("service closed the connection without replying"))?;
        Ok(bincode::deserialize(&frame)?)
    }

    async fn request(&self, req: Request, timeout: Duration, retries: u32) -> Result<Reply> {
        let payload = bincode::serialize(&req)?;
        let mut attempt = 0;
        let mut last_err: Option<anyhow::Error> = None;

        while attempt <= retries {
            match tokio::time::timeout(timeout, self.round_trip(&payload)).await {
                Ok(Ok(Reply::Error(err))) => return Err(ServiceError(err).into()),
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) => {
                    warn!("ipc request attempt {} failed: {e:?}", attempt + 1);
                    last_err = Some(e);
                }
                Err(e) => {
                    warn!("ipc request attempt {} timed out: {e:?}", attempt + 1);
                    last_err = Some(e.into());
                }
            }

            attempt += 1;
            if attempt <= retries {
                sleep(Duration::from_millis(BACKOFF_MS) * attempt).await;
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("request failed")))
    }
}
