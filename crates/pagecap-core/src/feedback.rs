//! Transient per-page badge feedback.
//!
//! Success and failure flash a glyph that clears itself after a short
//! duration, so no stale state lingers on the page's indicator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContextId;

/// Glyph and background color of a badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

impl Badge {
    #[must_use]
    pub fn new(text: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: color.into(),
        }
    }

    #[must_use]
    pub fn success() -> Self {
        Self::new("✓", "#4CAF50")
    }

    #[must_use]
    pub fn failure() -> Self {
        Self::new("⋯", "#E53935")
    }

    /// Shown while a target page is open.
    #[must_use]
    pub fn presence() -> Self {
        Self::new("●", "#0077B5")
    }
}

/// Something that can show a badge per page context.
pub trait BadgeSurface: Send + Sync + 'static {
    fn set_badge(&self, context: &ContextId, badge: &Badge);
    fn clear_badge(&self, context: &ContextId);
}

/// Renders badge changes as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBadgeSurface;

impl BadgeSurface for LogBadgeSurface {
    fn set_badge(&self, context: &ContextId, badge: &Badge) {
        info!(context = %context, badge = %badge.text, color = %badge.color, "Badge set");
    }

    fn clear_badge(&self, context: &ContextId) {
        info!(context = %context, "Badge cleared");
    }
}

struct Inner<B> {
    surface: B,
    flash: Duration,
    // Shared across contexts so a forgotten context never reuses a number.
    next_generation: AtomicU64,
    generations: Mutex<HashMap<ContextId, u64>>,
}

/// Flashes outcome badges and clears them after `flash`.
pub struct FeedbackIndicator<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for FeedbackIndicator<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BadgeSurface> FeedbackIndicator<B> {
    #[must_use]
    pub fn new(surface: B, flash: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                surface,
                flash,
                next_generation: AtomicU64::new(1),
                generations: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn surface(&self) -> &B {
        &self.inner.surface
    }

    fn bump(&self, context: &ContextId) -> u64 {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .generations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(context.clone(), generation);
        generation
    }

    fn current(&self, context: &ContextId) -> u64 {
        self.inner
            .generations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(context)
            .copied()
            .unwrap_or(0)
    }

    /// Flash the outcome of one persistence on `context`.
    ///
    /// Must be called inside a tokio runtime; the clear runs as a task.
    pub fn flash(&self, context: &ContextId, ok: bool) {
        let badge = if ok { Badge::success() } else { Badge::failure() };
        let generation = self.bump(context);
        self.inner.surface.set_badge(context, &badge);

        let indicator = self.clone();
        let context = context.clone();
        tokio::spawn(async move {
            tokio::time::sleep(indicator.inner.flash).await;
            // A newer flash owns the badge now.
            if indicator.current(&context) == generation {
                indicator.inner.surface.clear_badge(&context);
            }
        });
    }

    /// Show or clear the presence badge after a page load.
    pub fn presence(&self, context: &ContextId, on_target: bool) {
        self.bump(context);
        if on_target {
            self.inner.surface.set_badge(context, &Badge::presence());
        } else {
            self.inner.surface.clear_badge(context);
        }
    }

    /// Forget a context that went away.
    pub fn forget(&self, context: &ContextId) {
        self.inner
            .generations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(context);
    }
}
