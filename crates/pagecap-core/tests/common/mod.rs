//! Shared fixtures: a scripted page context and channel helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pagecap_core::channel::{CaptureAck, CaptureEnvelope, CaptureInbox};
use pagecap_core::config::CaptureConfig;
use pagecap_core::context::{ContextId, HistoryEvent, HistoryHook, HistoryKind, PageContext};
use pagecap_core::error::PageError;

pub const PROFILE_A: &str = "https://www.linkedin.com/in/ada-lovelace/";
pub const PROFILE_B: &str = "https://www.linkedin.com/in/grace-hopper/";
pub const PROFILE_C: &str = "https://www.linkedin.com/in/alan-turing/";
pub const FEED: &str = "https://www.linkedin.com/feed/";

/// Page context whose heading, extent samples and location are scripted.
pub struct FakePage {
    id: ContextId,
    location: Mutex<String>,
    heading: Mutex<Option<String>>,
    extents: Mutex<VecDeque<u64>>,
    last_extent: Mutex<u64>,
    samples: AtomicUsize,
    scrolls: AtomicUsize,
    hooks: Mutex<Vec<HistoryHook>>,
}

impl FakePage {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: ContextId::new(id),
            location: Mutex::new(url.to_string()),
            heading: Mutex::new(Some("Ada Lovelace".to_string())),
            extents: Mutex::new(VecDeque::new()),
            last_extent: Mutex::new(1_000),
            samples: AtomicUsize::new(0),
            scrolls: AtomicUsize::new(0),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_heading(self, heading: Option<&str>) -> Self {
        *self.heading.lock().unwrap() = heading.map(str::to_string);
        self
    }

    pub fn with_extents(self, extents: &[u64]) -> Self {
        self.extents.lock().unwrap().extend(extents.iter().copied());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_heading(&self, heading: Option<&str>) {
        *self.heading.lock().unwrap() = heading.map(str::to_string);
    }

    /// Client-side route change: update the location and fire every hook.
    pub fn navigate(&self, url: &str) {
        *self.location.lock().unwrap() = url.to_string();
        self.fire(HistoryKind::PushState);
    }

    /// Fire every installed hook without changing the location.
    pub fn fire(&self, kind: HistoryKind) {
        let location = self.location.lock().unwrap().clone();
        for hook in self.hooks.lock().unwrap().iter() {
            hook.fire(HistoryEvent::new(kind, location.clone()));
        }
    }

    pub fn hook_installs(&self) -> usize {
        self.hooks.lock().unwrap().len()
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }
}

impl PageContext for FakePage {
    fn context_id(&self) -> ContextId {
        self.id.clone()
    }

    async fn location(&self) -> Result<String, PageError> {
        Ok(self.location.lock().unwrap().clone())
    }

    async fn heading_text(&self) -> Result<Option<String>, PageError> {
        Ok(self.heading.lock().unwrap().clone())
    }

    async fn document_extent(&self) -> Result<u64, PageError> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last_extent.lock().unwrap();
        if let Some(next) = self.extents.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(*last)
    }

    async fn scroll_to_bottom(&self) -> Result<(), PageError> {
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn serialize_document(&self) -> Result<String, PageError> {
        let location = self.location.lock().unwrap().clone();
        Ok(format!("<html><body data-url=\"{location}\"></body></html>"))
    }

    fn install_history_hook(&self, hook: HistoryHook) -> Result<(), PageError> {
        self.hooks.lock().unwrap().push(hook);
        Ok(())
    }
}

/// Capture timings small enough for real-time tests.
pub fn fast_capture_config() -> CaptureConfig {
    CaptureConfig {
        name_poll_interval_ms: 5,
        name_timeout_ms: 200,
        sample_interval_ms: 10,
        settle_ms: 20,
        ..CaptureConfig::default()
    }
}

/// Collect requests until `quiet` passes without one.
pub async fn drain(inbox: &mut CaptureInbox, quiet: Duration) -> Vec<CaptureEnvelope> {
    let mut seen = Vec::new();
    while let Ok(Some(envelope)) = tokio::time::timeout(quiet, inbox.recv()).await {
        seen.push(envelope);
    }
    seen
}

/// Drain and answer with `ack`, returning the derived names seen.
pub async fn drain_and_ack(inbox: &mut CaptureInbox, quiet: Duration, ack: CaptureAck) -> Vec<String> {
    drain(inbox, quiet)
        .await
        .into_iter()
        .map(|envelope| {
            let name = envelope.request.derived_name.to_string();
            envelope.respond(ack);
            name
        })
        .collect()
}
