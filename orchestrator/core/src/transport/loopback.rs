//! In-Process Loopback Channel
//!
//! Direct channel-based frame delivery for embedded mode and tests. A pair
//! of loopback channels are cross-wired: frames sent on one side arrive on
//! the other. Tests use the peer side to script a fake provider endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{TransportChannel, TransportError, TransportFrame, TransportKind};

/// One side of an in-process channel pair
pub struct LoopbackChannel {
    tx: mpsc::Sender<TransportFrame>,
    rx: mpsc::Receiver<TransportFrame>,
    open: Arc<AtomicBool>,
    peer_open: Arc<AtomicBool>,
}

impl LoopbackChannel {
    /// Create a cross-wired channel pair
    ///
    /// Both sides start open.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(100)
    }

    /// Create a pair with custom queue capacity
    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        let a_open = Arc::new(AtomicBool::new(true));
        let b_open = Arc::new(AtomicBool::new(true));

        let a = Self {
            tx: b_tx,
            rx: a_rx,
            open: Arc::clone(&a_open),
            peer_open: Arc::clone(&b_open),
        };
        let b = Self {
            tx: a_tx,
            rx: b_rx,
            open: b_open,
            peer_open: a_open,
        };
        (a, b)
    }
}

#[async_trait]
impl TransportChannel for LoopbackChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Loopback
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: TransportFrame) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.peer_open.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("peer closed".into()));
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::SendFailed("peer dropped".into()))
    }

    async fn recv(&mut self) -> Result<TransportFrame, TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
