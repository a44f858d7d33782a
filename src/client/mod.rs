//! Dashboard client — the one outbound HTTP call the trigger makes.
//!
//! The refresh job only talks to this trait, so tests can hand it a
//! canned response instead of a live rendering service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::header::USER_AGENT;
use http::{HeaderMap, StatusCode};

/// Identifying header sent with every refresh request.
pub const TRIGGER_USER_AGENT: &str = "KindleDash-Trigger/1.0";

/// Status line and headers of a dashboard response. The body is never read.
#[derive(Debug, Clone)]
pub struct DashboardResponse {
    pub status: StatusCode,
    /// Reason phrase as sent on the status line.
    pub status_text: String,
    pub headers: HeaderMap,
}

impl DashboardResponse {
    /// Response whose reason phrase is the standard one for `status`.
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
        }
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header_str(&self, name: http::header::HeaderName) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

#[async_trait]
pub trait DashboardClient: Send + Sync {
    /// Issue a GET against `url` and return the response head.
    ///
    /// Transport failures (DNS, connect, I/O) are errors; any HTTP status,
    /// including 4xx/5xx, is a successful return.
    async fn get(&self, url: &str) -> Result<DashboardResponse>;
}

/// `reqwest`-backed client used in production.
pub struct HttpDashboardClient {
    client: reqwest::Client,
}

impl HttpDashboardClient {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpDashboardClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DashboardClient for HttpDashboardClient {
    async fn get(&self, url: &str) -> Result<DashboardResponse> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, TRIGGER_USER_AGENT)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        // hyper only records the phrase when it differs from the canonical one.
        let status_text = match resp.extensions().get::<hyper::ext::ReasonPhrase>() {
            Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
            None => resp.status().canonical_reason().unwrap_or("").to_string(),
        };

        Ok(DashboardResponse {
            status: resp.status(),
            status_text,
            headers: resp.headers().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve exactly one canned HTTP response and hand back the raw request.
    async fn serve_once(response: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });

        (format!("http://{}/dashboard", addr), rx)
    }

    fn test_client() -> HttpDashboardClient {
        HttpDashboardClient::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
    }

    #[tokio::test]
    async fn test_get_sends_user_agent_and_returns_head() {
        let (url, request) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 4\r\nConnection: close\r\n\r\nPNG!",
        )
        .await;

        let resp = test_client().get(&url).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.header_str(http::header::CONTENT_TYPE), Some("image/png"));
        assert_eq!(resp.header_str(http::header::CONTENT_LENGTH), Some("4"));

        let raw = request.await.unwrap().to_ascii_lowercase();
        assert!(raw.starts_with("get /dashboard "));
        assert!(raw.contains("user-agent: kindledash-trigger/1.0"));
    }

    #[tokio::test]
    async fn test_get_returns_error_statuses_as_responses() {
        let (url, _request) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let resp = test_client().get(&url).await.unwrap();
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.status_text, "Service Unavailable");
    }

    #[tokio::test]
    async fn test_get_keeps_custom_reason_phrase() {
        let (url, _request) = serve_once(
            "HTTP/1.1 503 Render Cold Start\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let resp = test_client().get(&url).await.unwrap();
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.status_text, "Render Cold Start");

        let err = crate::job::validate_response(&resp).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503: Render Cold Start");
    }

    #[tokio::test]
    async fn test_get_reason_phrase_for_nonstandard_code() {
        let (url, _request) = serve_once(
            "HTTP/1.1 599 Upstream Render Failed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let resp = test_client().get(&url).await.unwrap();
        assert_eq!(resp.status.as_u16(), 599);
        assert_eq!(resp.status_text, "Upstream Render Failed");
    }

    #[tokio::test]
    async fn test_get_connection_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = test_client()
            .get(&format!("http://{}/dashboard", addr))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GET http://"));
    }
}
