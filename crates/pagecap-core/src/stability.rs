//! Content convergence for lazy-loading pages.
//!
//! The page is pushed to its bottom edge and its extent sampled until the
//! value stops moving. A repeated sample only arms a settle period; the
//! sample taken after it has to repeat again before the content counts as
//! converged, so a late change (`100, 100, 250, …`) keeps the loop going.
//!
//! ```text
//!   sample ──changed──► sleep(sample_interval) ──► sample
//!     │
//!     └─repeat──► sleep(settle) ──► sample ──repeat──► Stable
//!                                     └──changed──► sleep(sample_interval) …
//! ```
//!
//! The loop is bounded by `max_rounds` and `max_wait`.
//!
//! A page that never changes still pays for confirmation: three samples, with
//! one sample interval and one settle period between them, before it
//! converges. At default cadence that is 1.4 s.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::trace;

use crate::config::CaptureConfig;
use crate::context::PageContext;
use crate::error::PageError;

/// What the caller should do after feeding one sample to the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStep {
    /// Extent moved; sample again after the sample interval.
    Changed,
    /// Extent repeated; wait out the settle period, then confirm.
    Settle,
    /// Extent repeated across the settle period.
    Converged,
}

/// Tracks the document extent across sampling rounds.
#[derive(Debug, Clone, Default)]
pub struct StabilityProbe {
    tracked: Option<u64>,
    settling: bool,
    rounds: u32,
}

impl StabilityProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one extent sample.
    pub fn observe(&mut self, extent: u64) -> ProbeStep {
        self.rounds = self.rounds.saturating_add(1);
        if self.tracked == Some(extent) {
            if self.settling {
                ProbeStep::Converged
            } else {
                self.settling = true;
                ProbeStep::Settle
            }
        } else {
            self.tracked = Some(extent);
            self.settling = false;
            ProbeStep::Changed
        }
    }

    /// Samples observed so far.
    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Most recent extent.
    #[must_use]
    pub fn tracked(&self) -> Option<u64> {
        self.tracked
    }
}

/// Tunables for one stabilization wait.
#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub sample_interval: Duration,
    pub settle: Duration,
    pub max_rounds: u32,
    pub max_wait: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for StabilityConfig {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            sample_interval: config.sample_interval(),
            settle: config.settle(),
            max_rounds: config.max_rounds,
            max_wait: config.max_wait(),
        }
    }
}

/// How a stabilization wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Convergence {
    /// Extent held across the settle period.
    Stable { extent: u64, rounds: u32 },
    /// Round or wall-clock budget ran out while the extent was still moving.
    BudgetExhausted {
        extent: Option<u64>,
        rounds: u32,
        elapsed_ms: u64,
    },
}

impl Convergence {
    #[must_use]
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable { .. })
    }

    #[must_use]
    pub fn rounds(&self) -> u32 {
        match self {
            Self::Stable { rounds, .. } | Self::BudgetExhausted { rounds, .. } => *rounds,
        }
    }
}

/// Scroll and sample `page` until its extent converges or the budget runs out.
pub async fn wait_for_stable_content<P: PageContext>(
    page: &P,
    config: &StabilityConfig,
) -> Result<Convergence, PageError> {
    let start = Instant::now();
    let mut probe = StabilityProbe::new();

    loop {
        let elapsed = start.elapsed();
        if probe.rounds() >= config.max_rounds || elapsed >= config.max_wait {
            return Ok(Convergence::BudgetExhausted {
                extent: probe.tracked(),
                rounds: probe.rounds(),
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        let extent = page.document_extent().await?;
        page.scroll_to_bottom().await?;

        let step = probe.observe(extent);
        trace!(context = %page.context_id(), extent, ?step, rounds = probe.rounds(), "Extent sample");
        match step {
            ProbeStep::Changed => sleep(config.sample_interval).await,
            ProbeStep::Settle => sleep(config.settle).await,
            ProbeStep::Converged => {
                return Ok(Convergence::Stable {
                    extent,
                    rounds: probe.rounds(),
                });
            }
        }
    }
}
