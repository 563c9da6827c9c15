//! Session refresh signal.
//!
//! The host process rewrites a `refresh.json` file when the underlying
//! session changes (new session id, new FIFO, new transcript). The store
//! must follow without restarting, so this module watches that file via
//! filesystem events with an mtime-polling fallback, and parses it into
//! [`SessionHandoff`] messages.
//!
//! A process signal that triggers an immediate re-read is the embedder's
//! concern (signals are process-global); it calls
//! `HudStore::reload_session_file` which funnels into the same parsing.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, warn};

use hud_core::{HudError, Result};

/// Fallback poll interval when filesystem events are unavailable or missed.
pub const REFRESH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Debounce window for filesystem events on the refresh file.
const REFRESH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Contents of `refresh.json`: where the session now lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandoff {
    pub session_id: String,
    pub fifo_path: PathBuf,
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,
}

/// Parse a refresh file.
pub fn read_handoff(path: &Path) -> Result<SessionHandoff> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| HudError::config_read(path, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| HudError::config_read(path, e.to_string()))
}

/// Configuration for the refresh watcher.
#[derive(Debug, Clone)]
pub struct RefreshWatcherConfig {
    /// The refresh file to watch
    pub path: PathBuf,
    /// Polling fallback interval
    pub poll_interval: Duration,
    /// Output channel buffer
    pub channel_buffer: usize,
}

impl RefreshWatcherConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: REFRESH_POLL_INTERVAL,
            channel_buffer: 8,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

type RefreshDebouncer = Debouncer<notify::RecommendedWatcher, notify_debouncer_full::RecommendedCache>;

/// Watches the refresh file and emits a [`SessionHandoff`] per change.
pub struct RefreshWatcher {
    _debouncer: Option<RefreshDebouncer>,
    task: JoinHandle<()>,
}

impl RefreshWatcher {
    /// Spawn the watcher. Must be called within a tokio runtime.
    ///
    /// Only changes after spawn are emitted; the store reads the initial
    /// file contents itself if it wants them.
    pub fn spawn(config: RefreshWatcherConfig) -> (Self, mpsc::Receiver<SessionHandoff>) {
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        let (notify_tx, notify_rx) = mpsc::channel::<()>(8);

        let debouncer = start_debouncer(&config.path, notify_tx);
        let task = tokio::spawn(run_watch(config, tx, notify_rx));

        (
            Self {
                _debouncer: debouncer,
                task,
            },
            rx,
        )
    }
}

impl Drop for RefreshWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Set up the notify debouncer on the refresh file's parent directory.
/// Failure is non-fatal: the poll loop still covers changes.
fn start_debouncer(path: &Path, notify_tx: mpsc::Sender<()>) -> Option<RefreshDebouncer> {
    let watched = path.to_path_buf();
    let parent = path.parent()?.to_path_buf();

    let result = new_debouncer(
        REFRESH_DEBOUNCE,
        None,
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                let relevant = events
                    .iter()
                    .any(|event| event.event.paths.iter().any(|p| p == &watched));
                if relevant {
                    let _ = notify_tx.blocking_send(());
                }
            }
            Err(errors) => {
                for error in errors {
                    warn!(error = ?error, "refresh watcher error");
                }
            }
        },
    );

    match result {
        Ok(mut debouncer) => match debouncer.watch(&parent, RecursiveMode::NonRecursive) {
            Ok(()) => Some(debouncer),
            Err(err) => {
                debug!(path = %parent.display(), error = %err, "refresh watch failed, polling only");
                None
            }
        },
        Err(err) => {
            debug!(error = %err, "refresh debouncer unavailable, polling only");
            None
        }
    }
}

async fn run_watch(
    config: RefreshWatcherConfig,
    tx: mpsc::Sender<SessionHandoff>,
    mut notify_rx: mpsc::Receiver<()>,
) {
    let mut last_modified = modified_time(&config.path);
    let mut notify_open = true;

    let mut ticker = interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately; skip it so only changes emit
    ticker.tick().await;

    loop {
        tokio::select! {
            event = notify_rx.recv(), if notify_open => {
                if event.is_none() {
                    notify_open = false;
                    continue;
                }
                if !check(&config.path, &mut last_modified, &tx).await {
                    return;
                }
            }
            _ = ticker.tick() => {
                if !check(&config.path, &mut last_modified, &tx).await {
                    return;
                }
            }
        }
    }
}

/// Re-stat the file; on a new mtime, parse and emit. Returns false once the
/// consumer is gone.
async fn check(
    path: &Path,
    last_modified: &mut Option<SystemTime>,
    tx: &mpsc::Sender<SessionHandoff>,
) -> bool {
    let modified = modified_time(path);
    if modified.is_none() || modified == *last_modified {
        return true;
    }
    *last_modified = modified;

    match read_handoff(path) {
        Ok(handoff) => tx.send(handoff).await.is_ok(),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "refresh file unreadable");
            true
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[test]
    fn test_read_handoff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresh.json");
        std::fs::write(
            &path,
            r#"{"sessionId":"abc","fifoPath":"/tmp/hud.fifo","transcriptPath":"/tmp/t.jsonl"}"#,
        )
        .unwrap();

        let handoff = read_handoff(&path).unwrap();
        assert_eq!(handoff.session_id, "abc");
        assert_eq!(handoff.fifo_path, PathBuf::from("/tmp/hud.fifo"));
        assert_eq!(handoff.transcript_path, Some(PathBuf::from("/tmp/t.jsonl")));
    }

    #[test]
    fn test_read_handoff_transcript_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresh.json");
        std::fs::write(&path, r#"{"sessionId":"abc","fifoPath":"/tmp/hud.fifo"}"#).unwrap();

        let handoff = read_handoff(&path).unwrap();
        assert_eq!(handoff.transcript_path, None);
    }

    #[test]
    fn test_read_handoff_missing_or_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_handoff(&dir.path().join("nope.json")).is_err());

        let path = dir.path().join("refresh.json");
        std::fs::write(&path, r#"{"fifoPath":"/tmp/x"}"#).unwrap();
        assert!(read_handoff(&path).is_err());
    }

    #[tokio::test]
    async fn test_watcher_emits_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresh.json");

        let config = RefreshWatcherConfig::new(&path)
            .with_poll_interval(Duration::from_millis(50));
        let (_watcher, mut rx) = RefreshWatcher::spawn(config);

        // file appears after spawn
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(&path, r#"{"sessionId":"s1","fifoPath":"/tmp/a.fifo"}"#).unwrap();

        let handoff = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for handoff")
            .expect("watcher channel closed");
        assert_eq!(handoff.session_id, "s1");

        // a rewrite emits again
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(&path, r#"{"sessionId":"s2","fifoPath":"/tmp/b.fifo"}"#).unwrap();

        let handoff = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for second handoff")
            .expect("watcher channel closed");
        assert_eq!(handoff.session_id, "s2");
    }

    #[tokio::test]
    async fn test_watcher_ignores_invalid_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresh.json");

        let config = RefreshWatcherConfig::new(&path)
            .with_poll_interval(Duration::from_millis(50));
        let (_watcher, mut rx) = RefreshWatcher::spawn(config);

        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(&path, "garbage").unwrap();

        // no emission for unparseable content
        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
    }
}
