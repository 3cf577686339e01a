//! pagecap-core: Core library for pagecap
//!
//! This crate captures a single-page application's rendered document at the
//! moment its lazily loaded content has settled, and hands the artifact to a
//! persistence layer.
//!
//! # Architecture
//!
//! ```text
//!  page context                           background context
//!  ────────────                           ──────────────────
//!  HistoryHook ──► CaptureAgent           CaptureCoordinator ◄── HostEvent
//!                   │  resolve_name             │   (navigation, page load)
//!                   │  wait_for_stable_content  │
//!                   └─ CaptureOutbox ─────────► CaptureInbox ──► DownloadFacility
//!                          ◄──────── CaptureAck ┘                FeedbackIndicator
//! ```
//!
//! # Modules
//!
//! - `agent`: capture-trigger state machine (idempotent activation)
//! - `session`: per-context capture sessions and the session registry
//! - `context`: page-context abstraction and history hooks
//! - `naming`: derived-name slugging and heading resolution
//! - `stability`: content convergence probe
//! - `wait`: fixed-interval polling with a deadline
//! - `channel`: request/response channel between the two contexts
//! - `coordinator`: persistence, re-activation and feedback
//! - `host`: in-process script injection
//! - `artifact`: artifact paths and data URIs
//! - `downloads`: download facility and filesystem implementation
//! - `settings`: auto-capture setting store
//! - `feedback`: transient badge indicator
//! - `target`: target URL pattern
//! - `config`: configuration management
//! - `logging`: structured logging setup
//! - `browser`: Chrome DevTools host (feature-gated: `browser`)
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod agent;
pub mod artifact;
pub mod channel;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod downloads;
pub mod error;
pub mod feedback;
pub mod host;
pub mod logging;
pub mod naming;
pub mod session;
pub mod settings;
pub mod stability;
pub mod target;
pub mod wait;

#[cfg(feature = "browser")]
pub mod browser;

pub use error::{ConfigError, Error, PageError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
