use std::time::Duration;

use anyhow::{Context, Result};
use core_types::SearchError;
use core_types::config::EncoderConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Encoder, check_vector};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `POST {endpoint}/embeddings` service.
///
/// Uses the blocking reqwest client; call it from a thread that may block
/// (the service runs searches on tokio's blocking pool).
#[derive(Debug, Clone)]
pub struct RemoteEncoder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl RemoteEncoder {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build embedding http client")?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            model: model.into(),
            api_key: None,
            dimension,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn from_config(cfg: &EncoderConfig) -> Result<Self> {
        let enc = Self::new(
            &cfg.endpoint,
            cfg.model.clone(),
            cfg.dimension,
            Duration::from_millis(cfg.timeout_ms),
        )?;
        Ok(match &cfg.api_key {
            Some(key) => enc.with_api_key(key.clone()),
            None => enc,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Extract the first embedding from a response body and check its width.
pub fn parse_embedding_response(body: &str, expected: usize) -> Result<Vec<f32>, SearchError> {
    let resp: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::encoding(format!("malformed embedding response: {e}")))?;
    let vector = resp
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| SearchError::encoding("embedding response contained no data"))?;
    check_vector(&vector, expected)?;
    Ok(vector)
}

impl Encoder for RemoteEncoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .map_err(|e| SearchError::encoding(format!("embedding request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| SearchError::encoding(format!("embedding response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(SearchError::encoding(format!(
                "embedding service returned {status}"
            )));
        }
        debug!(url = %self.url, bytes = text.len(), "embedding response received");
        parse_embedding_response(&text, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// One-shot HTTP server: answers the first request with `status` and
    /// `body`, then hands back the raw request it received.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = conn.read(&mut buf).unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            conn.write_all(reply.as_bytes()).unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (endpoint, server)
    }

    #[test]
    fn successful_response_yields_the_vector() {
        let (endpoint, server) = serve_once("200 OK", r#"{"data":[{"embedding":[0.5,-0.5,0.25,1.0]}]}"#);
        let enc = RemoteEncoder::new(&endpoint, "mpnet-v1", 4, Duration::from_secs(5))
            .unwrap()
            .with_api_key("sk-test");

        let v = enc.encode("hello there").unwrap();
        assert_eq!(v, vec![0.5, -0.5, 0.25, 1.0]);

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /v1/embeddings "), "{request}");
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains(r#""input":["hello there"]"#), "{request}");
        assert!(request.contains(r#""model":"mpnet-v1""#), "{request}");
    }

    #[test]
    fn server_error_is_an_encoding_error() {
        let (endpoint, server) = serve_once("500 Internal Server Error", r#"{"error":"model crashed"}"#);
        let enc = RemoteEncoder::new(&endpoint, "m", 4, Duration::from_secs(5)).unwrap();
        let err = enc.encode("hello").unwrap_err();
        assert!(matches!(err, SearchError::Encoding(_)));
        assert!(err.to_string().contains("500"), "{err}");
        server.join().unwrap();
    }

    #[test]
    fn parses_openai_style_payload() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.5,-0.25,1.0]}],"model":"m"}"#;
        let v = parse_embedding_response(body, 3).unwrap();
        assert_eq!(v, vec![0.5, -0.25, 1.0]);
    }

    #[test]
    fn width_and_shape_errors_are_encoding_errors() {
        let body = r#"{"data":[{"embedding":[0.5,0.5]}]}"#;
        assert!(matches!(
            parse_embedding_response(body, 3),
            Err(SearchError::Encoding(_))
        ));
        assert!(matches!(
            parse_embedding_response(r#"{"data":[]}"#, 3),
            Err(SearchError::Encoding(_))
        ));
        assert!(matches!(
            parse_embedding_response("<html>", 3),
            Err(SearchError::Encoding(_))
        ));
    }

    #[test]
    fn endpoint_trailing_slash_is_normalized() {
        let enc = RemoteEncoder::new("http://localhost:9/v1/", "m", 4, Duration::from_secs(1))
            .unwrap();
        assert_eq!(enc.url(), "http://localhost:9/v1/embeddings");
        assert_eq!(enc.model_id(), "m");
    }

    #[test]
    fn unreachable_service_is_an_encoding_error() {
        // Port 9 (discard) is almost never listening locally.
        let enc = RemoteEncoder::new("http://127.0.0.1:9/v1", "m", 4, Duration::from_millis(200))
            .unwrap();
        assert!(matches!(enc.encode("hello"), Err(SearchError::Encoding(_))));
    }
}
