//! Transport abstraction for protocol calls.
//!
//! Every protocol call is a JSON POST. The transport returns whatever status
//! the remote answered with; deciding what a 4xx/5xx means is the caller's
//! job. Only connection-level failures are errors.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// A remote's answer to a POST.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport trait for delivering protocol messages.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body and return the response, whatever its status.
    async fn post(&self, url: &str, body: &Value) -> Result<TransportResponse>;
}

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport over reqwest.
///
/// Every request is bounded by a timeout so an unresponsive remote turns
/// into a transport error instead of a stuck dispatch worker.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), timeout)
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: &Value) -> Result<TransportResponse> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;
        // Non-JSON bodies (proxy error pages and the like) are kept as strings.
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(TransportResponse { status, body })
    }
}

/// A simple in-memory transport for testing.
///
/// URLs are routed to registered endpoints; unrouted URLs behave like an
/// unreachable host.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{Mutex, RwLock};

    /// Something that answers POSTs on a URL.
    #[async_trait]
    pub trait Endpoint: Send + Sync {
        async fn handle(&self, body: Value) -> TransportResponse;
    }

    struct FnEndpoint<F>(F);

    #[async_trait]
    impl<F> Endpoint for FnEndpoint<F>
    where
        F: Fn(Value) -> TransportResponse + Send + Sync,
    {
        async fn handle(&self, body: Value) -> TransportResponse {
            (self.0)(body)
        }
    }

    /// In-memory network of endpoints.
    #[derive(Default)]
    pub struct MemoryTransport {
        routes: RwLock<HashMap<String, Arc<dyn Endpoint>>>,
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl MemoryTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Route a URL to an endpoint.
        pub async fn route(&self, url: impl Into<String>, endpoint: Arc<dyn Endpoint>) {
            self.routes.write().await.insert(url.into(), endpoint);
        }

        /// Route a URL to a synchronous closure.
        pub async fn route_fn<F>(&self, url: impl Into<String>, f: F)
        where
            F: Fn(Value) -> TransportResponse + Send + Sync + 'static,
        {
            self.route(url, Arc::new(FnEndpoint(f))).await;
        }

        /// Every POST attempted so far, routed or not.
        pub async fn sent(&self) -> Vec<(String, Value)> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn post(&self, url: &str, body: &Value) -> Result<TransportResponse> {
            self.sent.lock().await.push((url.to_string(), body.clone()));

            let endpoint = self.routes.read().await.get(url).cloned();
            match endpoint {
                Some(endpoint) => Ok(endpoint.handle(body.clone()).await),
                None => Err(ProtocolError::Transport(format!(
                    "connection refused: {}",
                    url
                ))),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn test_http_transport_default_timeout() {
            assert_eq!(HttpTransport::default().timeout(), DEFAULT_TIMEOUT);
            assert_eq!(
                HttpTransport::new(Duration::from_secs(2)).timeout(),
                Duration::from_secs(2)
            );
        }

        #[tokio::test]
        async fn test_routes_and_records() {
            let transport = MemoryTransport::new();
            transport
                .route_fn("http://bpp/confirm", |body| {
                    TransportResponse::ok(json!({"echo": body}))
                })
                .await;

            let response = transport
                .post("http://bpp/confirm", &json!({"a": 1}))
                .await
                .unwrap();
            assert_eq!(response.body["echo"]["a"], 1);

            assert!(transport.post("http://nowhere", &json!({})).await.is_err());
            assert_eq!(transport.sent().await.len(), 2);
        }
    }
}
