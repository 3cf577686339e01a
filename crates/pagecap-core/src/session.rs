//! Capture sessions and the session registry.
//!
//! One [`CaptureSession`] exists per page context for as long as the agent is
//! armed there. The registry is what makes activation idempotent: a context
//! that already has a session gets its capture handle invoked, never a second
//! history hook.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::context::ContextId;

/// Result of one capture attempt, as seen from the page context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The coordinator persisted the artifact.
    Saved,
    /// The coordinator reported a persistence failure.
    Failed,
    /// No acknowledgment arrived (channel closed).
    Unacknowledged,
    /// A newer attempt on the same page took over before this one emitted.
    Superseded,
    /// The page went away mid-capture.
    Aborted,
}

type TriggerFn = dyn Fn() -> JoinHandle<CaptureOutcome> + Send + Sync;

/// Stable handle to "perform one capture" on a particular page.
#[derive(Clone)]
pub struct CaptureHandle {
    trigger: Arc<TriggerFn>,
}

impl CaptureHandle {
    pub fn new(trigger: impl Fn() -> JoinHandle<CaptureOutcome> + Send + Sync + 'static) -> Self {
        Self {
            trigger: Arc::new(trigger),
        }
    }

    /// Start a capture attempt. Attempts are independent tasks.
    pub fn invoke(&self) -> JoinHandle<CaptureOutcome> {
        (self.trigger)()
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle").finish_non_exhaustive()
    }
}

/// Per-context capture state.
#[derive(Debug)]
pub struct CaptureSession {
    context: ContextId,
    last_url: Mutex<String>,
    armed: AtomicBool,
    generation: AtomicU64,
    in_flight: AtomicUsize,
    handle: Mutex<Option<CaptureHandle>>,
}

impl CaptureSession {
    #[must_use]
    pub fn new(context: ContextId, initial_url: impl Into<String>) -> Self {
        Self {
            context,
            last_url: Mutex::new(initial_url.into()),
            armed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    #[must_use]
    pub fn last_url(&self) -> String {
        self.last_url
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Record `location` if it differs from the last accepted one.
    ///
    /// Returns true when the navigation is accepted.
    pub fn accept_navigation(&self, location: &str) -> bool {
        let mut last = self
            .last_url
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *last == location {
            return false;
        }
        *last = location.to_string();
        true
    }

    /// Mark the history hook installed. Returns false if it already was.
    pub fn arm(&self) -> bool {
        !self.armed.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub(crate) fn set_handle(&self, handle: CaptureHandle) {
        *self
            .handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    /// The capture handle, once setup has finished.
    #[must_use]
    pub fn handle(&self) -> Option<CaptureHandle> {
        self.handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Start a capture through the stored handle.
    pub fn trigger(&self) -> Option<JoinHandle<CaptureOutcome>> {
        self.handle().map(|handle| handle.invoke())
    }

    /// Claim a new attempt generation.
    pub(crate) fn begin_attempt(&self) -> u64 {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn end_attempt(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Whether a newer attempt started after `generation`.
    #[must_use]
    pub fn is_superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Attempts currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Attempts started over the session's lifetime.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Outcome of reserving a registry slot.
#[derive(Debug, Clone)]
pub enum Reservation {
    /// The caller owns first-time setup for this new session.
    Fresh(Arc<CaptureSession>),
    /// A session already existed.
    Existing(Arc<CaptureSession>),
}

/// Sessions keyed by page-context identity.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ContextId, Arc<CaptureSession>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ContextId, Arc<CaptureSession>>> {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, context: &ContextId) -> Option<Arc<CaptureSession>> {
        self.lock().get(context).cloned()
    }

    /// Insert `session` unless the context already has one.
    pub fn reserve(&self, session: CaptureSession) -> Reservation {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(session.context()) {
            return Reservation::Existing(Arc::clone(existing));
        }
        let session = Arc::new(session);
        sessions.insert(session.context().clone(), Arc::clone(&session));
        Reservation::Fresh(session)
    }

    /// Forget a context (page closed or reloaded into a new document).
    pub fn remove(&self, context: &ContextId) -> Option<Arc<CaptureSession>> {
        self.lock().remove(context)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
