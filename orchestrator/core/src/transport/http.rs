//! HTTP Request/Response Channel
//!
//! Strict request/response delivery over HTTP. Used for provider
//! control-plane traffic: ephemeral token minting, signed-URL issuance and
//! server-side tool lookups. Every `send` performs one request and queues the
//! response body for the next `recv`.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{TransportChannel, TransportError, TransportFrame, TransportKind};

/// Default per-request deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Request/response channel over HTTP
///
/// The channel is "open" as soon as the client is built; there is no
/// persistent connection to tear down beyond the client's pool.
pub struct HttpChannel {
    client: reqwest::Client,
    endpoint: String,
    bearer: Option<String>,
    /// Responses queued for `recv`, in request order
    pending: Mutex<VecDeque<TransportFrame>>,
    open: bool,
}

impl HttpChannel {
    /// Create a channel targeting `endpoint`
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectFailed` if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, bearer: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            bearer,
            pending: Mutex::new(VecDeque::new()),
            open: false,
        })
    }

    /// POST a JSON body to a path relative to the endpoint and decode the JSON response
    ///
    /// This is the typed fast-path used by adapters for control-plane calls;
    /// the frame-based [`TransportChannel`] interface wraps the same request
    /// cycle.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SendFailed` on request failure, `Handshake` on
    /// a non-success status, or `Serialization` if the body cannot be decoded.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let url = self.join(path);
        let mut req = self.client.post(&url).json(body);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::Handshake(format!(
                "{url} returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| TransportError::Serialization(e.to_string()))
    }

    /// GET a path relative to the endpoint and decode the JSON response
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::post_json`].
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, TransportError> {
        let url = self.join(path);
        let mut req = self.client.get(&url);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::Handshake(format!(
                "{url} returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| TransportError::Serialization(e.to_string()))
    }

    fn join(&self, path: &str) -> String {
        if path.is_empty() {
            self.endpoint.clone()
        } else {
            format!(
                "{}/{}",
                self.endpoint.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        }
    }
}

#[async_trait]
impl TransportChannel for HttpChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    async fn send(&self, frame: TransportFrame) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::InvalidState("channel not open".into()));
        }

        let TransportFrame::Text(body) = frame else {
            return Err(TransportError::SendFailed(
                "http channel carries text frames only".into(),
            ));
        };

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        let response = self.post_json("", &value).await?;

        self.pending
            .lock()
            .push_back(TransportFrame::Text(response.to_string()));
        Ok(())
    }

    async fn recv(&mut self) -> Result<TransportFrame, TransportError> {
        // Strict request/response: a recv must follow a completed send.
        self.pending.lock().pop_front().ok_or_else(|| {
            TransportError::InvalidState("no pending response; send a request first".into())
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.pending.lock().clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_paths() {
        let chan = HttpChannel::new("https://api.example.com/v1/", None).unwrap();
        assert_eq!(chan.join("token"), "https://api.example.com/v1/token");
        assert_eq!(chan.join("/token"), "https://api.example.com/v1/token");
        assert_eq!(chan.join(""), "https://api.example.com/v1/");
    }

    #[tokio::test]
    async fn test_recv_without_send_is_invalid() {
        let mut chan = HttpChannel::new("https://api.example.com", None).unwrap();
        chan.open().await.unwrap();
        let err = chan.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_send_requires_open() {
        let chan = HttpChannel::new("https://api.example.com", None).unwrap();
        let err = chan
            .send(TransportFrame::Text("{}".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidState(_)));
    }
}
