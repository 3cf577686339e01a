//! The capture agent: idempotent activation and the per-page capture loop.
//!
//! ```text
//! activate(page)
//!   ├─ session exists ─────────────► invoke its capture handle   (Retriggered)
//!   ├─ auto-capture off ───────────► nothing recorded            (Idle)
//!   └─ first time ─► reserve session ─► store handle ─► install hook ─► initial capture (Armed)
//!
//! hook event ─► location changed? ─► matches target? ─► new capture task
//! capture task: resolve name ─► stabilize ─► serialize ─► send ─► await ack
//! ```
//!
//! History events for one session are handled by a single task, so
//! navigation acceptance is strictly ordered. Capture attempts are separate
//! tasks and may overlap.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{CaptureOutbox, CaptureRequest};
use crate::config::{CaptureConfig, OverlapPolicy};
use crate::context::{HistoryEvent, HistoryHook, PageContext};
use crate::error::{PageError, Result};
use crate::naming::resolve_name;
use crate::session::{CaptureHandle, CaptureOutcome, CaptureSession, Reservation, SessionRegistry};
use crate::settings::SettingsStore;
use crate::stability::{Convergence, StabilityConfig, wait_for_stable_content};
use crate::target::TargetPattern;

/// What an activation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// The page already had a session; a fresh capture was started.
    Retriggered,
    /// The page's session is still being set up; its initial capture covers this request.
    Pending,
    /// Auto-capture is off. Nothing was installed.
    Idle,
    /// First-time setup ran: hook installed and initial capture started.
    Armed,
    /// The session already accepted this location; nothing started.
    Unchanged,
}

/// Capture agent shared by every page context of one host.
pub struct CaptureAgent<S> {
    settings: S,
    registry: Arc<SessionRegistry>,
    outbox: CaptureOutbox,
    config: Arc<CaptureConfig>,
    target: TargetPattern,
}

impl<S: SettingsStore> CaptureAgent<S> {
    pub fn new(
        settings: S,
        outbox: CaptureOutbox,
        config: CaptureConfig,
        target: TargetPattern,
    ) -> Self {
        Self {
            settings,
            registry: Arc::new(SessionRegistry::new()),
            outbox,
            config: Arc::new(config),
            target,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Activate the agent in `page`.
    ///
    /// Safe to call any number of times for the same page: the history hook
    /// is installed at most once per context.
    pub async fn activate<P: PageContext>(&self, page: Arc<P>) -> Result<Activation> {
        self.activate_with(page, None).await
    }

    /// Activate the agent in `page` in response to a navigation to `url`.
    ///
    /// The navigation goes through the same location check as the history
    /// hook, so a navigation reported by both is captured once.
    pub async fn activate_for_navigation<P: PageContext>(
        &self,
        page: Arc<P>,
        url: &str,
    ) -> Result<Activation> {
        self.activate_with(page, Some(url)).await
    }

    async fn activate_with<P: PageContext>(
        &self,
        page: Arc<P>,
        navigation: Option<&str>,
    ) -> Result<Activation> {
        let context = page.context_id();

        if let Some(session) = self.registry.get(&context) {
            return Ok(reactivate(&session, navigation));
        }

        if !self.settings.auto_capture_enabled().await? {
            debug!(context = %context, "Auto-capture off; agent idle");
            return Ok(Activation::Idle);
        }

        let initial_url = match navigation {
            Some(url) => url.to_string(),
            None => page.location().await?,
        };
        let session = match self
            .registry
            .reserve(CaptureSession::new(context.clone(), initial_url))
        {
            Reservation::Existing(session) => return Ok(reactivate(&session, navigation)),
            Reservation::Fresh(session) => session,
        };

        session.set_handle(self.capture_handle(&page, &session));

        let (hook, events) = HistoryHook::channel();
        if let Err(err) = page.install_history_hook(hook) {
            self.registry.remove(&context);
            return Err(err.into());
        }
        session.arm();
        tokio::spawn(process_history(
            Arc::downgrade(&session),
            events,
            self.target.clone(),
        ));

        info!(context = %context, url = %session.last_url(), "Capture agent armed");
        session.trigger();
        Ok(Activation::Armed)
    }

    fn capture_handle<P: PageContext>(
        &self,
        page: &Arc<P>,
        session: &Arc<CaptureSession>,
    ) -> CaptureHandle {
        let page = Arc::clone(page);
        let session = Arc::downgrade(session);
        let outbox = self.outbox.clone();
        let config = Arc::clone(&self.config);
        CaptureHandle::new(move || {
            tokio::spawn(run_capture(
                Arc::clone(&page),
                session.clone(),
                outbox.clone(),
                Arc::clone(&config),
            ))
        })
    }
}

fn reactivate(session: &CaptureSession, navigation: Option<&str>) -> Activation {
    if navigation.is_some_and(|url| !session.accept_navigation(url)) {
        debug!(context = %session.context(), url = ?navigation, "Navigation already accepted");
        return Activation::Unchanged;
    }
    if session.trigger().is_some() {
        debug!(context = %session.context(), "Existing session; capture retriggered");
        Activation::Retriggered
    } else {
        Activation::Pending
    }
}

/// Drain one session's history events in order.
async fn process_history(
    session: Weak<CaptureSession>,
    mut events: mpsc::UnboundedReceiver<HistoryEvent>,
    target: TargetPattern,
) {
    while let Some(event) = events.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        if !session.accept_navigation(&event.location) {
            debug!(context = %session.context(), kind = ?event.kind, "Location unchanged; ignored");
            continue;
        }
        if !target.matches_location(&event.location) {
            debug!(context = %session.context(), url = %event.location, "Not a target page");
            continue;
        }
        debug!(context = %session.context(), url = %event.location, kind = ?event.kind, "Navigation accepted");
        session.trigger();
    }
}

async fn run_capture<P: PageContext>(
    page: Arc<P>,
    session: Weak<CaptureSession>,
    outbox: CaptureOutbox,
    config: Arc<CaptureConfig>,
) -> CaptureOutcome {
    let Some(session) = session.upgrade() else {
        return CaptureOutcome::Aborted;
    };
    let generation = session.begin_attempt();
    let outcome = match attempt(&page, &session, generation, &outbox, &config).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(context = %session.context(), error = %err, "Capture aborted");
            CaptureOutcome::Aborted
        }
    };
    session.end_attempt();
    outcome
}

async fn attempt<P: PageContext>(
    page: &Arc<P>,
    session: &CaptureSession,
    generation: u64,
    outbox: &CaptureOutbox,
    config: &CaptureConfig,
) -> std::result::Result<CaptureOutcome, PageError> {
    let context = session.context();
    let derived_name = resolve_name(page, config).await;

    match wait_for_stable_content(page.as_ref(), &StabilityConfig::from(config)).await? {
        Convergence::Stable { extent, rounds } => {
            debug!(context = %context, extent, rounds, "Content stable");
        }
        Convergence::BudgetExhausted {
            extent,
            rounds,
            elapsed_ms,
        } => {
            warn!(context = %context, ?extent, rounds, elapsed_ms, "Content still changing; capturing anyway");
        }
    }

    let content = page.serialize_document().await?;

    if config.overlap == OverlapPolicy::Supersede && session.is_superseded(generation) {
        debug!(context = %context, derived_name = %derived_name, generation, "Superseded by newer attempt");
        return Ok(CaptureOutcome::Superseded);
    }

    debug!(context = %context, derived_name = %derived_name, bytes = content.len(), "Sending capture");
    let request = CaptureRequest {
        derived_name: derived_name.clone(),
        content,
    };
    Ok(match outbox.send(context.clone(), request).await {
        Some(ack) if ack.ok => {
            info!(context = %context, derived_name = %derived_name, "Capture saved");
            CaptureOutcome::Saved
        }
        Some(_) => {
            warn!(context = %context, derived_name = %derived_name, "Capture not saved");
            CaptureOutcome::Failed
        }
        None => {
            warn!(context = %context, derived_name = %derived_name, "No acknowledgment; channel closed");
            CaptureOutcome::Unacknowledged
        }
    })
}
