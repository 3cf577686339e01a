//! The auto-capture setting.
//!
//! One process-wide boolean, default on. The file-backed store creates its
//! file on first read so the value survives restarts from then on.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::SettingsError;

/// File name inside the data directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Value used when nothing has been persisted yet.
pub const AUTO_CAPTURE_DEFAULT: bool = true;

/// Persisted setting payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(rename = "autoSaveEnabled", default = "default_enabled")]
    pub auto_save_enabled: bool,
}

fn default_enabled() -> bool {
    AUTO_CAPTURE_DEFAULT
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            auto_save_enabled: AUTO_CAPTURE_DEFAULT,
        }
    }
}

/// Where the auto-capture flag lives.
///
/// Read by the agent on activation and by the coordinator on every
/// navigation signal; written only by the settings surface.
pub trait SettingsStore: Send + Sync + 'static {
    fn auto_capture_enabled(&self)
    -> impl Future<Output = Result<bool, SettingsError>> + Send;

    fn set_auto_capture_enabled(
        &self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), SettingsError>> + Send;
}

/// JSON file store (`{"autoSaveEnabled": true}`).
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<StoredSettings>, SettingsError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SettingsError::Read(err)),
        }
    }

    async fn write(&self, settings: StoredSettings) -> Result<(), SettingsError> {
        let body = serde_json::to_vec_pretty(&settings)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist_atomically(&path, &body))
            .await
            .map_err(|err| SettingsError::Write(std::io::Error::other(err)))?
    }
}

/// Write `body` to a uniquely named sibling, then rename it over `path`.
/// Every write gets its own temp file; readers only ever see a complete one.
fn persist_atomically(path: &Path, body: &[u8]) -> Result<(), SettingsError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(SettingsError::Write)?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(SettingsError::Write)?;
    tmp.write_all(body).map_err(SettingsError::Write)?;
    tmp.persist(path)
        .map(drop)
        .map_err(|err| SettingsError::Write(err.error))
}

impl SettingsStore for FileSettingsStore {
    async fn auto_capture_enabled(&self) -> Result<bool, SettingsError> {
        if let Some(settings) = self.read().await? {
            return Ok(settings.auto_save_enabled);
        }
        let settings = StoredSettings::default();
        self.write(settings).await?;
        debug!(path = %self.path.display(), "Initialized settings with defaults");
        Ok(settings.auto_save_enabled)
    }

    async fn set_auto_capture_enabled(&self, enabled: bool) -> Result<(), SettingsError> {
        self.write(StoredSettings {
            auto_save_enabled: enabled,
        })
        .await?;
        debug!(path = %self.path.display(), enabled, "Auto-capture setting updated");
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug)]
pub struct MemorySettingsStore {
    enabled: AtomicBool,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(AUTO_CAPTURE_DEFAULT)
    }
}

impl SettingsStore for MemorySettingsStore {
    async fn auto_capture_enabled(&self) -> Result<bool, SettingsError> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    async fn set_auto_capture_enabled(&self, enabled: bool) -> Result<(), SettingsError> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

impl<S: SettingsStore> SettingsStore for std::sync::Arc<S> {
    fn auto_capture_enabled(&self) -> impl Future<Output = Result<bool, SettingsError>> + Send {
        (**self).auto_capture_enabled()
    }

    fn set_auto_capture_enabled(
        &self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), SettingsError>> + Send {
        (**self).set_auto_capture_enabled(enabled)
    }
}

/// Text shown by the settings surface.
#[must_use]
pub fn status_message(enabled: bool) -> &'static str {
    if enabled {
        "✅ Auto-capture is ON. Every matching page you open will be archived."
    } else {
        "⏸ Auto-capture is OFF. No pages will be saved until you turn it back on."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_read_initializes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = FileSettingsStore::new(&path);

        assert!(store.auto_capture_enabled().await.unwrap());
        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["autoSaveEnabled"], true);
    }

    #[tokio::test]
    async fn toggle_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);

        FileSettingsStore::new(&path)
            .set_auto_capture_enabled(false)
            .await
            .unwrap();
        assert!(!FileSettingsStore::new(&path).auto_capture_enabled().await.unwrap());
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(SETTINGS_FILE_NAME)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_reads_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        for round in 0..50 {
            let path = dir.path().join(format!("round-{round}")).join(SETTINGS_FILE_NAME);
            let first = FileSettingsStore::new(&path);
            let second = FileSettingsStore::new(&path);
            let (a, b) = tokio::join!(first.auto_capture_enabled(), second.auto_capture_enabled());
            assert!(a.unwrap(), "round {round}");
            assert!(b.unwrap(), "round {round}");
            let raw = std::fs::read_to_string(&path).unwrap();
            let stored: StoredSettings = serde_json::from_str(&raw).unwrap();
            assert!(stored.auto_save_enabled);
        }
    }

    #[tokio::test]
    async fn missing_key_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{}").unwrap();
        assert!(FileSettingsStore::new(&path).auto_capture_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "not json").unwrap();
        let err = FileSettingsStore::new(&path)
            .auto_capture_enabled()
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Malformed(_)));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySettingsStore::default();
        assert!(store.auto_capture_enabled().await.unwrap());
        store.set_auto_capture_enabled(false).await.unwrap();
        assert!(!store.auto_capture_enabled().await.unwrap());
    }

    #[test]
    fn status_text_mentions_state() {
        assert!(status_message(true).contains("ON"));
        assert!(status_message(false).contains("OFF"));
    }
}
