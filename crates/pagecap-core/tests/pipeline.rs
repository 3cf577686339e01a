//! End-to-end: host events → coordinator → agent → coordinator → disk.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, watch};

use pagecap_core::agent::{Activation, CaptureAgent};
use pagecap_core::channel::{CaptureRequest, capture_channel};
use pagecap_core::config::PersistenceConfig;
use pagecap_core::context::{ContextId, PageContext};
use pagecap_core::coordinator::{CaptureCoordinator, HostEvent, NavigationSignal, Reactivation};
use pagecap_core::downloads::FsDownloads;
use pagecap_core::feedback::{FeedbackIndicator, LogBadgeSurface};
use pagecap_core::host::AgentHost;
use pagecap_core::naming::derive_name;
use pagecap_core::settings::{FileSettingsStore, SettingsStore};
use pagecap_core::target::TargetPattern;

use common::{FEED, FakePage, PROFILE_A, PROFILE_B, PROFILE_C, fast_capture_config};

type Host = AgentHost<Arc<FileSettingsStore>, FakePage>;
type Coordinator =
    CaptureCoordinator<Arc<FileSettingsStore>, FsDownloads, LogBadgeSurface, Arc<Host>>;

struct Rig {
    _dir: tempfile::TempDir,
    downloads: PathBuf,
    settings: Arc<FileSettingsStore>,
    host: Arc<Host>,
    coordinator: Arc<Coordinator>,
    events: mpsc::Sender<HostEvent>,
    shutdown: watch::Sender<bool>,
    run: tokio::task::JoinHandle<()>,
}

fn rig() -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    let settings = Arc::new(FileSettingsStore::new(dir.path().join("settings.json")));
    let (outbox, inbox) = capture_channel(16);

    let agent = Arc::new(CaptureAgent::new(
        Arc::clone(&settings),
        outbox,
        fast_capture_config(),
        TargetPattern::default(),
    ));
    let host = Arc::new(AgentHost::new(agent));
    let coordinator = Arc::new(CaptureCoordinator::new(
        Arc::clone(&settings),
        FsDownloads::new(&downloads),
        FeedbackIndicator::new(LogBadgeSurface, Duration::from_millis(50)),
        Arc::clone(&host),
        TargetPattern::default(),
        PersistenceConfig::default(),
    ));

    let (events, host_events) = mpsc::channel(16);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(Arc::clone(&coordinator).run(inbox, host_events, shutdown_rx));

    Rig {
        _dir: dir,
        downloads,
        settings,
        host,
        coordinator,
        events,
        shutdown,
        run,
    }
}

fn artifacts(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, out);
            } else {
                out.push(path);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out.sort();
    out
}

async fn wait_for_artifacts(root: &Path, count: usize) -> Vec<PathBuf> {
    for _ in 0..200 {
        let found = artifacts(root);
        let written = found
            .iter()
            .all(|p| std::fs::metadata(p).is_ok_and(|m| m.len() > 0));
        if found.len() >= count && written {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    artifacts(root)
}

fn signal(page: &FakePage, frame_id: u64, url: &str) -> HostEvent {
    HostEvent::HistoryStateUpdated(NavigationSignal {
        context: page.context_id(),
        frame_id,
        url: url.to_string(),
    })
}

#[tokio::test]
async fn navigation_signal_arms_agent_and_persists() {
    let rig = rig();
    let page = FakePage::new("tab-1", PROFILE_A).into_arc();
    rig.host.register_page(Arc::clone(&page));

    rig.events.send(signal(&page, 0, PROFILE_A)).await.unwrap();
    let saved = wait_for_artifacts(&rig.downloads, 1).await;
    assert_eq!(saved.len(), 1);
    assert_eq!(page.hook_installs(), 1);

    let name = saved[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("linkedin_ada_lovelace_"), "{name}");
    assert!(name.ends_with(".html"));
    let body = std::fs::read_to_string(&saved[0]).unwrap();
    assert!(body.contains("ada-lovelace"));

    // In-page hook captures the next profile on its own.
    page.navigate(PROFILE_B);
    assert_eq!(wait_for_artifacts(&rig.downloads, 2).await.len(), 2);
    assert_eq!(page.hook_installs(), 1);

    rig.shutdown.send(true).unwrap();
    rig.run.await.unwrap();
}

#[tokio::test]
async fn embedded_frames_and_other_paths_are_ignored() {
    let rig = rig();
    let page = FakePage::new("tab-1", PROFILE_A).into_arc();
    rig.host.register_page(Arc::clone(&page));

    let frame = NavigationSignal {
        context: page.context_id(),
        frame_id: 7,
        url: PROFILE_A.to_string(),
    };
    assert_eq!(
        rig.coordinator.on_history_state_updated(&frame).await,
        Reactivation::IgnoredFrame
    );
    let feed = NavigationSignal {
        frame_id: 0,
        url: FEED.to_string(),
        ..frame
    };
    assert_eq!(
        rig.coordinator.on_history_state_updated(&feed).await,
        Reactivation::IgnoredUrl
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(artifacts(&rig.downloads).is_empty());
    assert_eq!(page.hook_installs(), 0);
    rig.shutdown.send(true).unwrap();
    rig.run.await.unwrap();
}

#[tokio::test]
async fn disabled_setting_blocks_reactivation() {
    let rig = rig();
    rig.settings.set_auto_capture_enabled(false).await.unwrap();
    let page = FakePage::new("tab-1", PROFILE_A).into_arc();
    rig.host.register_page(Arc::clone(&page));

    rig.events.send(signal(&page, 0, PROFILE_A)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(artifacts(&rig.downloads).is_empty());
    assert_eq!(page.hook_installs(), 0);

    rig.shutdown.send(true).unwrap();
    rig.run.await.unwrap();
}

#[tokio::test]
async fn repeated_signals_reuse_the_session() {
    let rig = rig();
    let page = FakePage::new("tab-1", PROFILE_A).into_arc();
    rig.host.register_page(Arc::clone(&page));

    let first = NavigationSignal {
        context: page.context_id(),
        frame_id: 0,
        url: PROFILE_A.to_string(),
    };
    assert_eq!(
        rig.coordinator.on_history_state_updated(&first).await,
        Reactivation::Injected(Activation::Armed)
    );
    assert_eq!(
        rig.coordinator.on_history_state_updated(&first).await,
        Reactivation::Injected(Activation::Unchanged)
    );
    assert_eq!(wait_for_artifacts(&rig.downloads, 1).await.len(), 1);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(artifacts(&rig.downloads).len(), 1);

    let next = NavigationSignal {
        url: PROFILE_B.to_string(),
        ..first
    };
    assert_eq!(
        rig.coordinator.on_history_state_updated(&next).await,
        Reactivation::Injected(Activation::Retriggered)
    );
    assert_eq!(page.hook_installs(), 1);
    assert_eq!(wait_for_artifacts(&rig.downloads, 2).await.len(), 2);

    rig.shutdown.send(true).unwrap();
    rig.run.await.unwrap();
}

#[tokio::test]
async fn navigation_seen_by_hook_and_signal_is_captured_once() {
    let rig = rig();
    let page = FakePage::new("tab-1", PROFILE_A).into_arc();
    rig.host.register_page(Arc::clone(&page));
    rig.events.send(signal(&page, 0, PROFILE_A)).await.unwrap();
    assert_eq!(wait_for_artifacts(&rig.downloads, 1).await.len(), 1);

    // The in-page hook sees the navigation before the host signal arrives.
    page.navigate(PROFILE_B);
    assert_eq!(wait_for_artifacts(&rig.downloads, 2).await.len(), 2);
    let late = NavigationSignal {
        context: page.context_id(),
        frame_id: 0,
        url: PROFILE_B.to_string(),
    };
    assert_eq!(
        rig.coordinator.on_history_state_updated(&late).await,
        Reactivation::Injected(Activation::Unchanged)
    );

    // The host signal arrives before the hook fires.
    let early = NavigationSignal {
        url: PROFILE_C.to_string(),
        ..late
    };
    assert_eq!(
        rig.coordinator.on_history_state_updated(&early).await,
        Reactivation::Injected(Activation::Retriggered)
    );
    page.navigate(PROFILE_C);
    assert_eq!(wait_for_artifacts(&rig.downloads, 3).await.len(), 3);

    // Both paths again, through the event loop this time.
    page.navigate(PROFILE_A);
    rig.events.send(signal(&page, 0, PROFILE_A)).await.unwrap();
    assert_eq!(wait_for_artifacts(&rig.downloads, 4).await.len(), 4);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(artifacts(&rig.downloads).len(), 4);
    assert_eq!(page.hook_installs(), 1);

    rig.shutdown.send(true).unwrap();
    rig.run.await.unwrap();
}

#[tokio::test]
async fn unknown_page_injection_fails_softly() {
    let rig = rig();
    let stray = NavigationSignal {
        context: ContextId::new("never-registered"),
        frame_id: 0,
        url: PROFILE_A.to_string(),
    };
    assert_eq!(
        rig.coordinator.on_history_state_updated(&stray).await,
        Reactivation::Failed
    );
    rig.shutdown.send(true).unwrap();
    rig.run.await.unwrap();
}

#[tokio::test]
async fn closing_a_page_releases_its_session() {
    let rig = rig();
    let page = FakePage::new("tab-1", PROFILE_A).into_arc();
    rig.host.register_page(Arc::clone(&page));
    rig.events.send(signal(&page, 0, PROFILE_A)).await.unwrap();
    wait_for_artifacts(&rig.downloads, 1).await;

    rig.events
        .send(HostEvent::PageClosed(page.context_id()))
        .await
        .unwrap();
    for _ in 0..100 {
        if rig.host.page(&page.context_id()).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(rig.host.page(&page.context_id()).is_none());
    assert!(rig.host.agent().registry().is_empty());

    rig.shutdown.send(true).unwrap();
    rig.run.await.unwrap();
}

#[tokio::test]
async fn same_second_captures_do_not_overwrite() {
    let rig = rig();
    let origin = ContextId::new("tab-1");
    let now = Utc.with_ymd_and_hms(2025, 5, 14, 10, 22, 33).unwrap();
    let first = CaptureRequest {
        derived_name: derive_name("Jane Doe"),
        content: "<html>first</html>".to_string(),
    };
    let second = CaptureRequest {
        content: "<html>second</html>".to_string(),
        ..first.clone()
    };

    assert!(rig.coordinator.persist_at(&origin, &first, now).await.ok);
    assert!(rig.coordinator.persist_at(&origin, &second, now).await.ok);

    let saved = artifacts(&rig.downloads);
    assert_eq!(saved.len(), 2);
    let bodies: Vec<String> = saved
        .iter()
        .map(|p| std::fs::read_to_string(p).unwrap())
        .collect();
    assert!(bodies.contains(&"<html>first</html>".to_string()));
    assert!(bodies.contains(&"<html>second</html>".to_string()));
    assert!(
        saved
            .iter()
            .any(|p| p.to_string_lossy().ends_with("2025-05-14T10-22-33-000Z (1).html"))
    );

    rig.shutdown.send(true).unwrap();
    rig.run.await.unwrap();
}

#[tokio::test]
async fn shutdown_drains_queued_captures() {
    let rig = rig();
    let page = FakePage::new("tab-1", PROFILE_A).into_arc();
    rig.host.register_page(Arc::clone(&page));
    rig.events.send(signal(&page, 0, PROFILE_A)).await.unwrap();
    wait_for_artifacts(&rig.downloads, 1).await;

    rig.shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), rig.run)
        .await
        .expect("coordinator stops promptly")
        .unwrap();
    assert_eq!(artifacts(&rig.downloads).len(), 1);
}
