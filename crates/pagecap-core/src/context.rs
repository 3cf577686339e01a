//! Page-context abstraction.
//!
//! A page context is the isolated execution environment bound to one tab's
//! document. It survives same-document navigations, so the capture agent
//! keeps one session per context and learns about route changes through a
//! [`HistoryHook`].

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PageError;

/// Identity of a page context (one tab's document lifetime).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Which history entry point fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    PushState,
    ReplaceState,
    PopState,
}

/// One interception of a history mutation, carrying the location observed
/// right after it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub kind: HistoryKind,
    pub location: String,
}

impl HistoryEvent {
    #[must_use]
    pub fn new(kind: HistoryKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }
}

/// Sink a page context fires into whenever pushState, replaceState or
/// popstate runs. Cloning shares the same session.
#[derive(Debug, Clone)]
pub struct HistoryHook {
    tx: mpsc::UnboundedSender<HistoryEvent>,
}

impl HistoryHook {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<HistoryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report a history mutation. Returns false once the owning session is gone.
    pub fn fire(&self, event: HistoryEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the owning session still listens.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// The capture agent's view of one page context.
///
/// Implementations wrap whatever actually hosts the document (a DevTools
/// target, a test double). Every method is a suspension point.
pub trait PageContext: Send + Sync + 'static {
    /// Stable identity of this context.
    fn context_id(&self) -> ContextId;

    /// Current location string.
    fn location(&self) -> impl Future<Output = Result<String, PageError>> + Send;

    /// Text content of the recognizable title element, if present.
    fn heading_text(&self) -> impl Future<Output = Result<Option<String>, PageError>> + Send;

    /// Total scrollable extent of the document.
    fn document_extent(&self) -> impl Future<Output = Result<u64, PageError>> + Send;

    /// Move the viewport to the bottom of the document.
    fn scroll_to_bottom(&self) -> impl Future<Output = Result<(), PageError>> + Send;

    /// Serialize the full rendered document.
    fn serialize_document(&self) -> impl Future<Output = Result<String, PageError>> + Send;

    /// Start reporting history mutations to `hook`.
    fn install_history_hook(&self, hook: HistoryHook) -> Result<(), PageError>;
}
