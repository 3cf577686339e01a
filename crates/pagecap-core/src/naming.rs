//! Derived artifact names.
//!
//! The name comes from the page heading: trimmed, ASCII letters lowercased,
//! and every other character replaced one-for-one by `_`. Nothing is
//! collapsed, so `"Jane A. Doe!!"` becomes `"jane_a__doe__"`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CaptureConfig;
use crate::context::PageContext;
use crate::wait::{WaitFor, poll_until};

/// Sentinel used when no heading can be found in time.
pub const UNKNOWN_NAME: &str = "unknown";

/// Separator substituted for every non-alphanumeric character.
pub const SEPARATOR: char = '_';

/// Filesystem-safe slug naming one capture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedName(String);

impl DerivedName {
    /// The sentinel name.
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_NAME.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_NAME
    }
}

impl fmt::Display for DerivedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Slug a heading into a derived name.
#[must_use]
pub fn derive_name(raw: &str) -> DerivedName {
    let slug: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                SEPARATOR
            }
        })
        .collect();
    if slug.is_empty() {
        DerivedName::unknown()
    } else {
        DerivedName(slug)
    }
}

/// Poll the page heading until it is present and non-empty, then slug it.
///
/// Timing out is a degraded result, not an error: the sentinel name is used
/// and the capture carries on. Evaluation errors count as "not yet".
pub async fn resolve_name<P: PageContext>(page: &Arc<P>, config: &CaptureConfig) -> DerivedName {
    let heading = poll_until(
        "non-empty heading",
        config.name_poll_interval(),
        config.name_timeout(),
        move || async move {
            match page.heading_text().await {
                Ok(Some(text)) if !text.trim().is_empty() => WaitFor::Ready(text),
                Ok(_) => WaitFor::not_ready("heading absent"),
                Err(err) => WaitFor::not_ready(err.to_string()),
            }
        },
    )
    .await;

    match heading {
        Ok(text) => derive_name(&text),
        Err(err) => {
            debug!(context = %page.context_id(), error = %err, "Heading not found; using sentinel name");
            DerivedName::unknown()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_replaced_one_for_one() {
        assert_eq!(derive_name("Jane A. Doe!!").as_str(), "jane_a__doe__");
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        assert_eq!(derive_name("  Ada Lovelace \n").as_str(), "ada_lovelace");
    }

    #[test]
    fn non_ascii_letters_become_separators() {
        assert_eq!(derive_name("José Ñúñez").as_str(), "jos_____ez");
    }

    #[test]
    fn blank_heading_is_unknown() {
        assert!(derive_name("   ").is_unknown());
        assert!(derive_name("").is_unknown());
    }

    #[test]
    fn digits_kept() {
        assert_eq!(derive_name("R2D2 v3").as_str(), "r2d2_v3");
    }
}
