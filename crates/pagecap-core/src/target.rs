//! Target page pattern (host + path prefix).

use url::Url;

use crate::config::TargetConfig;

/// Which URLs count as capture targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPattern {
    host: String,
    path_prefix: String,
}

impl TargetPattern {
    #[must_use]
    pub fn new(host: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            path_prefix: path_prefix.into(),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Navigation-signal filter: host equals and path starts with the prefix.
    #[must_use]
    pub fn matches_signal(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        parsed
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(&self.host))
            && parsed.path().starts_with(&self.path_prefix)
    }

    /// In-page filter for accepted navigations. The page context is already
    /// bound to one origin, so only the path is checked.
    #[must_use]
    pub fn matches_location(&self, location: &str) -> bool {
        match Url::parse(location) {
            Ok(parsed) => parsed.path().starts_with(&self.path_prefix),
            Err(_) => location.starts_with(&self.path_prefix),
        }
    }
}

impl Default for TargetPattern {
    fn default() -> Self {
        Self::from(&TargetConfig::default())
    }
}

impl From<&TargetConfig> for TargetPattern {
    fn from(config: &TargetConfig) -> Self {
        Self::new(&config.host, &config.path_prefix)
    }
}
