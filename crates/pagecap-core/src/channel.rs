//! Request/response channel between the page context and the coordinator.
//!
//! The agent sends one [`CaptureRequest`] per capture and waits for at most
//! one [`CaptureAck`]. Nothing is shared between the two sides except what
//! travels in the messages.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::context::ContextId;
use crate::naming::DerivedName;

/// A captured document on its way to persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename = "saveHtml", rename_all = "camelCase")]
pub struct CaptureRequest {
    pub derived_name: DerivedName,
    pub content: String,
}

/// Outcome reported back to the page context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureAck {
    pub ok: bool,
}

impl CaptureAck {
    #[must_use]
    pub fn success() -> Self {
        Self { ok: true }
    }

    #[must_use]
    pub fn failure() -> Self {
        Self { ok: false }
    }
}

/// A request in transit, with its origin and reply slot.
#[derive(Debug)]
pub struct CaptureEnvelope {
    pub origin: ContextId,
    pub request: CaptureRequest,
    reply: oneshot::Sender<CaptureAck>,
}

impl CaptureEnvelope {
    /// Answer the request. The page may already be gone; that is not an error.
    pub fn respond(self, ack: CaptureAck) {
        let _ = self.reply.send(ack);
    }

    /// Split into parts for handlers that answer later.
    #[must_use]
    pub fn into_parts(self) -> (ContextId, CaptureRequest, oneshot::Sender<CaptureAck>) {
        (self.origin, self.request, self.reply)
    }
}

/// Page-side sending half.
#[derive(Debug, Clone)]
pub struct CaptureOutbox {
    tx: mpsc::Sender<CaptureEnvelope>,
}

/// Coordinator-side receiving half.
#[derive(Debug)]
pub struct CaptureInbox {
    rx: mpsc::Receiver<CaptureEnvelope>,
}

/// Create a bounded capture channel.
#[must_use]
pub fn capture_channel(capacity: usize) -> (CaptureOutbox, CaptureInbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CaptureOutbox { tx }, CaptureInbox { rx })
}

impl CaptureOutbox {
    /// Send a request and wait for its acknowledgment.
    ///
    /// Returns `None` when the channel closes before an answer arrives.
    pub async fn send(&self, origin: ContextId, request: CaptureRequest) -> Option<CaptureAck> {
        let (reply, answer) = oneshot::channel();
        let envelope = CaptureEnvelope {
            origin,
            request,
            reply,
        };
        self.tx.send(envelope).await.ok()?;
        answer.await.ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl CaptureInbox {
    /// Next request, or `None` once every outbox is dropped.
    pub async fn recv(&mut self) -> Option<CaptureEnvelope> {
        self.rx.recv().await
    }

    /// Stop accepting new requests; queued ones can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
