//! In-process agent host.
//!
//! Maps page-context identities to live pages and "injects" the agent by
//! activating it directly. Activation is idempotent: injecting the same page
//! again retriggers a capture only when the navigation is new to its session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::agent::{Activation, CaptureAgent};
use crate::context::{ContextId, PageContext};
use crate::coordinator::ScriptInjector;
use crate::error::{Error, PageError, Result};
use crate::settings::SettingsStore;

/// Injector backed by a shared [`CaptureAgent`].
pub struct AgentHost<S, P> {
    agent: Arc<CaptureAgent<S>>,
    pages: Mutex<HashMap<ContextId, Arc<P>>>,
}

impl<S: SettingsStore, P: PageContext> AgentHost<S, P> {
    pub fn new(agent: Arc<CaptureAgent<S>>) -> Self {
        Self {
            agent,
            pages: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn agent(&self) -> &Arc<CaptureAgent<S>> {
        &self.agent
    }

    fn pages(&self) -> std::sync::MutexGuard<'_, HashMap<ContextId, Arc<P>>> {
        self.pages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make a page reachable for injection. Replaces any previous page with
    /// the same identity.
    pub fn register_page(&self, page: Arc<P>) {
        let context = page.context_id();
        debug!(context = %context, "Page registered");
        self.pages().insert(context, page);
    }

    /// Forget a page and its capture session.
    pub fn release_page(&self, context: &ContextId) -> Option<Arc<P>> {
        self.agent.registry().remove(context);
        self.pages().remove(context)
    }

    #[must_use]
    pub fn page(&self, context: &ContextId) -> Option<Arc<P>> {
        self.pages().get(context).cloned()
    }
}

impl<S: SettingsStore, P: PageContext> ScriptInjector for AgentHost<S, P> {
    async fn inject(&self, context: &ContextId, url: &str) -> Result<Activation> {
        let page = self
            .page(context)
            .ok_or_else(|| Error::Page(PageError::Closed(context.to_string())))?;
        self.agent.activate_for_navigation(page, url).await
    }

    fn release(&self, context: &ContextId) {
        self.release_page(context);
    }
}

impl<S: SettingsStore, P: PageContext> ScriptInjector for Arc<AgentHost<S, P>> {
    async fn inject(&self, context: &ContextId, url: &str) -> Result<Activation> {
        (**self).inject(context, url).await
    }

    fn release(&self, context: &ContextId) {
        self.release_page(context);
    }
}
