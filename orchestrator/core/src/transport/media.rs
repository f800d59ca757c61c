//! Peer-to-Peer Media Channel
//!
//! Delivery mechanism for the conversational-agent provider family: a
//! signaling handshake negotiates a session-scoped media endpoint, then a
//! media stream carries binary audio frames downstream and text events in
//! both directions.
//!
//! The vendor's ICE/SRTP internals are a black box behind the signed media
//! URL; what this channel models is the observable contract: one handshake,
//! one exclusive media stream, full teardown on close.

use async_trait::async_trait;
use tracing::debug;

use super::duplex::DuplexSocket;
use super::http::HttpChannel;
use super::traits::{TransportChannel, TransportError, TransportFrame, TransportKind};

/// Peer-to-peer media channel established through a signaling handshake
pub struct MediaChannel {
    signaling: HttpChannel,
    signaling_path: String,
    session_hint: serde_json::Value,
    stream: Option<DuplexSocket>,
}

impl MediaChannel {
    /// Create an unopened media channel
    ///
    /// `signaling` performs the handshake; `signaling_path` is the
    /// offer/answer endpoint; `session_hint` is the vendor-specific offer
    /// body (agent id, codec preferences).
    #[must_use]
    pub fn new(
        signaling: HttpChannel,
        signaling_path: impl Into<String>,
        session_hint: serde_json::Value,
    ) -> Self {
        Self {
            signaling,
            signaling_path: signaling_path.into(),
            session_hint,
            stream: None,
        }
    }

    /// Take ownership of the inbound frame queue of the media stream
    ///
    /// See [`DuplexSocket::take_inbound`]; same contract.
    pub fn take_inbound(
        &mut self,
    ) -> Option<tokio::sync::mpsc::Receiver<TransportFrame>> {
        self.stream.as_mut().and_then(DuplexSocket::take_inbound)
    }
}

#[async_trait]
impl TransportChannel for MediaChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Media
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Err(TransportError::InvalidState("already open".into()));
        }

        // Offer/answer: the answer carries the session-scoped media URL.
        let answer = self
            .signaling
            .post_json(&self.signaling_path, &self.session_hint)
            .await?;

        let media_url = answer
            .get("media_url")
            .or_else(|| answer.get("signed_url"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                TransportError::Handshake("signaling answer has no media url".into())
            })?;

        let mut stream = DuplexSocket::new(media_url, None);
        stream.open().await?;

        debug!(media_url, "media channel negotiated");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&self, frame: TransportFrame) -> Result<(), TransportError> {
        match &self.stream {
            Some(stream) => stream.send(frame).await,
            None => Err(TransportError::Closed),
        }
    }

    async fn recv(&mut self) -> Result<TransportFrame, TransportError> {
        match &mut self.stream {
            Some(stream) => stream.recv().await,
            None => Err(TransportError::InvalidState("channel not open".into())),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream.close().await?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.as_ref().is_some_and(TransportChannel::is_open)
    }
}
