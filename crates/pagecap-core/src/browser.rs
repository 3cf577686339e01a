//! Chrome DevTools host (feature `browser`).
//!
//! [`CdpPage`] adapts a chromiumoxide page to [`PageContext`]. Same-document
//! navigations of the main frame are forwarded to the page's history hook
//! and, as [`HostEvent`]s, to the coordinator. DevTools does not say whether
//! pushState or replaceState ran, so hook events are reported as pushes.

use std::sync::{Arc, Mutex};

use chromiumoxide::cdp::browser_protocol::page::{EventLoadEventFired, EventNavigatedWithinDocument};
use chromiumoxide::{Browser, BrowserConfig, Handler, Page};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::{ContextId, HistoryEvent, HistoryHook, HistoryKind, PageContext};
use crate::coordinator::{HostEvent, NavigationSignal, TOP_LEVEL_FRAME};
use crate::error::{Error, PageError, Result};

const EXTENT_SCRIPT: &str = "document.body ? document.body.scrollHeight : 0";
const SCROLL_SCRIPT: &str =
    "window.scrollTo(0, document.body ? document.body.scrollHeight : 0); true";
const SERIALIZE_SCRIPT: &str = "document.documentElement.outerHTML";

fn evaluation(err: impl std::fmt::Display) -> PageError {
    PageError::Evaluation(err.to_string())
}

/// A DevTools page target.
pub struct CdpPage {
    id: ContextId,
    page: Page,
    heading_script: String,
    hook: Arc<Mutex<Option<HistoryHook>>>,
    pump: JoinHandle<()>,
}

impl CdpPage {
    /// Wrap `page` and start forwarding its navigation events.
    pub async fn attach(
        page: Page,
        heading_selector: &str,
        host_events: mpsc::Sender<HostEvent>,
    ) -> std::result::Result<Arc<Self>, PageError> {
        let target: &str = page.target_id().as_ref();
        let id = ContextId::new(target);
        let selector = serde_json::to_string(heading_selector).map_err(evaluation)?;
        let heading_script = format!(
            "(() => {{ const el = document.querySelector({selector}); \
             return el ? el.textContent.trim() : null; }})()"
        );

        let navigations = page
            .event_listener::<EventNavigatedWithinDocument>()
            .await
            .map_err(|err| PageError::HookInstall(err.to_string()))?;
        let loads = page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(|err| PageError::HookInstall(err.to_string()))?;

        let hook: Arc<Mutex<Option<HistoryHook>>> = Arc::new(Mutex::new(None));
        let pump = tokio::spawn(pump_events(
            id.clone(),
            page.clone(),
            navigations,
            loads,
            Arc::clone(&hook),
            host_events,
        ));

        Ok(Arc::new(Self {
            id,
            page,
            heading_script,
            hook,
            pump,
        }))
    }

    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump_events(
    id: ContextId,
    page: Page,
    mut navigations: chromiumoxide::listeners::EventStream<EventNavigatedWithinDocument>,
    mut loads: chromiumoxide::listeners::EventStream<EventLoadEventFired>,
    hook: Arc<Mutex<Option<HistoryHook>>>,
    host_events: mpsc::Sender<HostEvent>,
) {
    loop {
        let event = tokio::select! {
            nav = navigations.next() => match nav {
                Some(nav) => {
                    let main = page.mainframe().await.ok().flatten();
                    let is_main = main.as_ref() == Some(&nav.frame_id);
                    if is_main {
                        let installed = hook
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .clone();
                        if let Some(hook) = installed {
                            hook.fire(HistoryEvent::new(HistoryKind::PushState, nav.url.clone()));
                        }
                    }
                    HostEvent::HistoryStateUpdated(NavigationSignal {
                        context: id.clone(),
                        frame_id: if is_main { TOP_LEVEL_FRAME } else { TOP_LEVEL_FRAME + 1 },
                        url: nav.url.clone(),
                    })
                }
                None => break,
            },
            load = loads.next() => match load {
                Some(_) => {
                    let url = page.url().await.ok().flatten().unwrap_or_default();
                    HostEvent::PageLoaded { context: id.clone(), url }
                }
                None => break,
            },
        };
        if host_events.send(event).await.is_err() {
            return;
        }
    }
    debug!(context = %id, "Page event streams ended");
    let _ = host_events.send(HostEvent::PageClosed(id)).await;
}

impl PageContext for CdpPage {
    fn context_id(&self) -> ContextId {
        self.id.clone()
    }

    async fn location(&self) -> std::result::Result<String, PageError> {
        match self.page.url().await {
            Ok(url) => Ok(url.unwrap_or_else(|| "about:blank".to_string())),
            Err(err) => Err(PageError::Closed(err.to_string())),
        }
    }

    async fn heading_text(&self) -> std::result::Result<Option<String>, PageError> {
        self.page
            .evaluate(self.heading_script.as_str())
            .await
            .map_err(evaluation)?
            .into_value::<Option<String>>()
            .map_err(evaluation)
    }

    async fn document_extent(&self) -> std::result::Result<u64, PageError> {
        let extent = self
            .page
            .evaluate(EXTENT_SCRIPT)
            .await
            .map_err(evaluation)?
            .into_value::<f64>()
            .map_err(evaluation)?;
        Ok(extent.max(0.0) as u64)
    }

    async fn scroll_to_bottom(&self) -> std::result::Result<(), PageError> {
        self.page
            .evaluate(SCROLL_SCRIPT)
            .await
            .map_err(evaluation)?;
        Ok(())
    }

    async fn serialize_document(&self) -> std::result::Result<String, PageError> {
        self.page
            .evaluate(SERIALIZE_SCRIPT)
            .await
            .map_err(evaluation)?
            .into_value::<String>()
            .map_err(evaluation)
    }

    fn install_history_hook(&self, hook: HistoryHook) -> std::result::Result<(), PageError> {
        let mut slot = self
            .hook
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.as_ref().is_some_and(HistoryHook::is_live) {
            debug!(context = %self.id, "Replacing live history hook");
        }
        *slot = Some(hook);
        Ok(())
    }
}

/// A launched browser plus its DevTools handler task.
pub struct BrowserHost {
    browser: Browser,
    handler: JoinHandle<()>,
    heading_selector: String,
    host_events: mpsc::Sender<HostEvent>,
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                warn!(error = %err, "DevTools handler error");
            }
        }
    })
}

impl BrowserHost {
    /// Launch Chrome (headed unless `headless`).
    pub async fn launch(
        headless: bool,
        heading_selector: impl Into<String>,
        host_events: mpsc::Sender<HostEvent>,
    ) -> Result<Self> {
        let builder = BrowserConfig::builder();
        let builder = if headless { builder } else { builder.with_head() };
        let config = builder.build().map_err(Error::Runtime)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|err| Error::Runtime(format!("failed to launch browser: {err}")))?;
        info!(headless, "Browser launched");
        Ok(Self {
            browser,
            handler: spawn_handler(handler),
            heading_selector: heading_selector.into(),
            host_events,
        })
    }

    /// Open `url` in a new tab and attach to it.
    pub async fn open(&self, url: &str) -> Result<Arc<CdpPage>> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|err| Error::Page(PageError::Closed(err.to_string())))?;
        let page = CdpPage::attach(page, &self.heading_selector, self.host_events.clone()).await?;
        info!(context = %page.context_id(), url, "Tab opened");
        Ok(page)
    }

    /// Close the browser and stop the handler.
    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}
