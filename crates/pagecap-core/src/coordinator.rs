//! Capture coordinator: persistence, re-activation and feedback.
//!
//! Runs in the long-lived background context. It never shares state with
//! page contexts; everything it learns arrives as a [`CaptureEnvelope`] or a
//! [`HostEvent`]. Every failure is contained here: logged at warn and shown
//! as a transient failure badge, never retried.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::Activation;
use crate::artifact::{artifact_path, to_data_uri};
use crate::channel::{CaptureAck, CaptureEnvelope, CaptureInbox, CaptureRequest};
use crate::config::PersistenceConfig;
use crate::context::ContextId;
use crate::downloads::{DownloadFacility, DownloadRequest};
use crate::error::Result;
use crate::feedback::{BadgeSurface, FeedbackIndicator};
use crate::settings::SettingsStore;
use crate::target::TargetPattern;

/// Frame id of a tab's top-level document.
pub const TOP_LEVEL_FRAME: u64 = 0;

/// "Same-document navigation completed" as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationSignal {
    pub context: ContextId,
    pub frame_id: u64,
    pub url: String,
}

/// Lifecycle notifications from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    HistoryStateUpdated(NavigationSignal),
    PageLoaded { context: ContextId, url: String },
    PageClosed(ContextId),
}

/// How the coordinator handled one navigation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "activation", rename_all = "snake_case")]
pub enum Reactivation {
    /// Came from an embedded frame.
    IgnoredFrame,
    /// URL outside the target pattern.
    IgnoredUrl,
    /// Auto-capture is off.
    Disabled,
    /// The agent was activated in the page.
    Injected(Activation),
    /// Injection (or the setting read) failed.
    Failed,
}

/// Loads and activates the capture agent in a page context.
pub trait ScriptInjector: Send + Sync + 'static {
    /// Activate the agent in `context`, which just navigated to `url`.
    fn inject(
        &self,
        context: &ContextId,
        url: &str,
    ) -> impl Future<Output = Result<Activation>> + Send;

    /// The page context went away.
    fn release(&self, context: &ContextId);
}

/// Background-side capture service.
pub struct CaptureCoordinator<S, D, B, I> {
    settings: S,
    downloads: D,
    feedback: FeedbackIndicator<B>,
    injector: I,
    target: TargetPattern,
    persistence: PersistenceConfig,
}

impl<S, D, B, I> CaptureCoordinator<S, D, B, I>
where
    S: SettingsStore,
    D: DownloadFacility,
    B: BadgeSurface,
    I: ScriptInjector,
{
    pub fn new(
        settings: S,
        downloads: D,
        feedback: FeedbackIndicator<B>,
        injector: I,
        target: TargetPattern,
        persistence: PersistenceConfig,
    ) -> Self {
        Self {
            settings,
            downloads,
            feedback,
            injector,
            target,
            persistence,
        }
    }

    #[must_use]
    pub fn injector(&self) -> &I {
        &self.injector
    }

    #[must_use]
    pub fn downloads(&self) -> &D {
        &self.downloads
    }

    #[must_use]
    pub fn feedback(&self) -> &FeedbackIndicator<B> {
        &self.feedback
    }

    /// Re-activate the agent after an in-app navigation.
    pub async fn on_history_state_updated(&self, signal: &NavigationSignal) -> Reactivation {
        if signal.frame_id != TOP_LEVEL_FRAME {
            debug!(context = %signal.context, frame_id = signal.frame_id, "Embedded frame; ignored");
            return Reactivation::IgnoredFrame;
        }
        if !self.target.matches_signal(&signal.url) {
            debug!(context = %signal.context, url = %signal.url, "Outside target pattern; ignored");
            return Reactivation::IgnoredUrl;
        }
        match self.settings.auto_capture_enabled().await {
            Ok(true) => {}
            Ok(false) => {
                debug!(context = %signal.context, "Auto-capture off; not re-activating");
                return Reactivation::Disabled;
            }
            Err(err) => {
                warn!(context = %signal.context, error = %err, "Could not read auto-capture setting");
                return Reactivation::Failed;
            }
        }

        match self.injector.inject(&signal.context, &signal.url).await {
            Ok(activation) => {
                debug!(context = %signal.context, url = %signal.url, ?activation, "Agent re-activated");
                Reactivation::Injected(activation)
            }
            Err(err) => {
                warn!(context = %signal.context, url = %signal.url, error = %err, "Agent injection failed");
                self.feedback.flash(&signal.context, false);
                Reactivation::Failed
            }
        }
    }

    /// Persist one capture now.
    pub async fn persist(&self, origin: &ContextId, request: &CaptureRequest) -> CaptureAck {
        self.persist_at(origin, request, Utc::now()).await
    }

    /// Persist one capture with an explicit clock reading.
    pub async fn persist_at(
        &self,
        origin: &ContextId,
        request: &CaptureRequest,
        now: DateTime<Utc>,
    ) -> CaptureAck {
        let filename = artifact_path(&self.persistence, &request.derived_name, now);
        let url = to_data_uri(&self.persistence.mime, &request.content);

        match self
            .downloads
            .download(DownloadRequest::new(url, filename.clone()))
            .await
        {
            Ok(done) => {
                info!(
                    context = %origin,
                    derived_name = %request.derived_name,
                    id = done.id.0,
                    path = %done.path.display(),
                    "Capture persisted"
                );
                self.feedback.flash(origin, true);
                CaptureAck::success()
            }
            Err(err) => {
                warn!(context = %origin, path = %filename, error = %err, "Download failed");
                self.feedback.flash(origin, false);
                CaptureAck::failure()
            }
        }
    }

    /// Page finished loading: show or clear the presence badge.
    pub fn on_page_loaded(&self, context: &ContextId, url: &str) {
        self.feedback.presence(context, self.target.matches_signal(url));
    }

    /// Page closed: drop everything tied to it.
    pub fn on_page_closed(&self, context: &ContextId) {
        debug!(context = %context, "Page closed");
        self.feedback.forget(context);
        self.injector.release(context);
    }

    /// Dispatch one host event.
    pub async fn handle_host_event(&self, event: HostEvent) {
        match event {
            HostEvent::HistoryStateUpdated(signal) => {
                self.on_history_state_updated(&signal).await;
            }
            HostEvent::PageLoaded { context, url } => self.on_page_loaded(&context, &url),
            HostEvent::PageClosed(context) => self.on_page_closed(&context),
        }
    }

    async fn answer(self: Arc<Self>, envelope: CaptureEnvelope) {
        let (origin, request, reply) = envelope.into_parts();
        let ack = self.persist(&origin, &request).await;
        if reply.send(ack).is_err() {
            debug!(context = %origin, "Page gone before acknowledgment");
        }
    }

    /// Serve captures and host events until shutdown or until both inputs close.
    ///
    /// Each persistence runs as its own task. Host events are handled in
    /// arrival order. On shutdown, queued captures are drained and in-flight
    /// persistence is awaited.
    pub async fn run(
        self: Arc<Self>,
        mut inbox: CaptureInbox,
        mut host_events: mpsc::Receiver<HostEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tasks = JoinSet::new();
        let mut inbox_open = true;
        let mut events_open = true;
        let mut watching = true;
        let stopped = *shutdown.borrow();
        info!("Capture coordinator running");

        while !stopped && (inbox_open || events_open) {
            tokio::select! {
                changed = shutdown.changed(), if watching => match changed {
                    Ok(()) if *shutdown.borrow() => break,
                    Ok(()) => {}
                    // Sender dropped: no shutdown can arrive any more.
                    Err(_) => watching = false,
                },
                envelope = inbox.recv(), if inbox_open => match envelope {
                    Some(envelope) => {
                        tasks.spawn(Arc::clone(&self).answer(envelope));
                    }
                    None => inbox_open = false,
                },
                event = host_events.recv(), if events_open => match event {
                    Some(event) => self.handle_host_event(event).await,
                    None => events_open = false,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "Persistence task failed");
                    }
                }
            }
        }

        inbox.close();
        while let Some(envelope) = inbox.recv().await {
            tasks.spawn(Arc::clone(&self).answer(envelope));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Persistence task failed");
            }
        }
        info!("Capture coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloads::FsDownloads;
    use crate::error::{Error, PageError};
    use crate::feedback::LogBadgeSurface;
    use crate::naming::derive_name;
    use crate::settings::MemorySettingsStore;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingInjector {
        injected: Mutex<Vec<(ContextId, String)>>,
        fail: AtomicBool,
    }

    impl ScriptInjector for Arc<CountingInjector> {
        async fn inject(&self, context: &ContextId, url: &str) -> Result<Activation> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Page(PageError::Closed(context.to_string())));
            }
            self.injected
                .lock()
                .unwrap()
                .push((context.clone(), url.to_string()));
            Ok(Activation::Retriggered)
        }

        fn release(&self, _context: &ContextId) {}
    }

    type TestCoordinator =
        CaptureCoordinator<MemorySettingsStore, FsDownloads, LogBadgeSurface, Arc<CountingInjector>>;

    fn coordinator(root: &std::path::Path, enabled: bool) -> (TestCoordinator, Arc<CountingInjector>) {
        let injector = Arc::new(CountingInjector::default());
        let coordinator = CaptureCoordinator::new(
            MemorySettingsStore::new(enabled),
            FsDownloads::new(root),
            FeedbackIndicator::new(LogBadgeSurface, Duration::from_millis(1200)),
            Arc::clone(&injector),
            TargetPattern::default(),
            PersistenceConfig::default(),
        );
        (coordinator, injector)
    }

    fn signal(frame_id: u64, url: &str) -> NavigationSignal {
        NavigationSignal {
            context: ContextId::new("tab-9"),
            frame_id,
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn only_top_frame_target_signals_inject() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, injector) = coordinator(dir.path(), true);

        assert_eq!(
            coordinator
                .on_history_state_updated(&signal(3, "https://www.linkedin.com/in/ada/"))
                .await,
            Reactivation::IgnoredFrame
        );
        assert_eq!(
            coordinator
                .on_history_state_updated(&signal(0, "https://www.linkedin.com/feed/"))
                .await,
            Reactivation::IgnoredUrl
        );
        assert_eq!(
            coordinator
                .on_history_state_updated(&signal(0, "https://www.linkedin.com/in/ada/"))
                .await,
            Reactivation::Injected(Activation::Retriggered)
        );
        let injected = injector.injected.lock().unwrap();
        assert_eq!(injected.len(), 1);
        assert_eq!(injected[0].1, "https://www.linkedin.com/in/ada/");
    }

    #[tokio::test]
    async fn disabled_setting_skips_injection() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, injector) = coordinator(dir.path(), false);
        assert_eq!(
            coordinator
                .on_history_state_updated(&signal(0, "https://www.linkedin.com/in/ada/"))
                .await,
            Reactivation::Disabled
        );
        assert!(injector.injected.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn injection_failure_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, injector) = coordinator(dir.path(), true);
        injector.fail.store(true, Ordering::SeqCst);
        assert_eq!(
            coordinator
                .on_history_state_updated(&signal(0, "https://www.linkedin.com/in/ada/"))
                .await,
            Reactivation::Failed
        );
    }

    #[tokio::test]
    async fn persist_writes_artifact_at_expected_path() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _) = coordinator(dir.path(), true);
        let now = Utc.with_ymd_and_hms(2025, 5, 14, 10, 22, 33).unwrap();
        let request = CaptureRequest {
            derived_name: derive_name("Jane A. Doe!!"),
            content: "<html>jane</html>".to_string(),
        };

        let ack = coordinator
            .persist_at(&ContextId::new("tab-9"), &request, now)
            .await;
        assert!(ack.ok);
        let expected = dir
            .path()
            .join("LinkedIn_Profiles/2025-05/linkedin_jane_a__doe___2025-05-14T10-22-33-000Z.html");
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "<html>jane</html>");
    }

    #[tokio::test]
    async fn unwritable_root_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let (coordinator, _) = coordinator(&blocker, true);
        let request = CaptureRequest {
            derived_name: derive_name("Ada"),
            content: "<html></html>".to_string(),
        };
        let ack = coordinator.persist(&ContextId::new("tab-9"), &request).await;
        assert_eq!(ack, CaptureAck::failure());
    }
}
