//! Resilient connection to the event FIFO.
//!
//! [`EventStream`] owns a background task that opens the named pipe, reads
//! newline-delimited events, and forwards [`StreamMessage`]s over a bounded
//! channel. It survives the pipe not existing yet (the producer may start
//! later), producer restarts, and transient I/O errors, reconnecting with
//! exponential backoff up to a hard attempt ceiling.
//!
//! The pipe is opened in read-write mode: holding our own write end means
//! the FIFO never delivers EOF while producers come and go. A plain file is
//! accepted as a fallback source so recorded event logs can be replayed.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use hud_core::ErrorCode;
use serde::{Deserialize, Serialize};

use crate::decode::{decode, DecodeError};
use crate::event::HudEvent;

/// Buffer size of the outgoing message channel.
pub const STREAM_CHANNEL_BUFFER: usize = 256;

/// Poll interval while the pipe path does not exist yet.
pub const PIPE_WAIT_POLL: Duration = Duration::from_millis(500);

/// First reconnect delay.
pub const RECONNECT_BASE_MS: u64 = 100;

/// Backoff multiplier between reconnect attempts.
pub const RECONNECT_MULTIPLIER: f64 = 1.5;

/// Upper bound on a single reconnect delay.
pub const RECONNECT_MAX_MS: u64 = 5000;

/// Reconnect attempts before the stream settles into `Error` for good.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 50;

/// Window within which an identical parse error is emitted only once.
pub const PARSE_ERROR_DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Connection state of the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Waiting for the pipe to exist or for the open to complete
    Connecting,
    /// Handle is open, lines are flowing
    Connected,
    /// Stream ended (producer closed); reconnect pending or stream closed
    Disconnected,
    /// I/O failure, or the reconnect ceiling was exhausted
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Messages delivered to the consumer of an [`EventStream`].
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// Connection status changed
    Status(ConnectionStatus),
    /// A decoded event
    Event(Box<HudEvent>),
    /// A classified decode failure or schema warning
    ParseError(DecodeError),
}

/// Control commands from the handle to the connection task.
enum Command {
    Switch(PathBuf),
    Close,
}

/// Handle to the background connection task.
///
/// Dropping the handle aborts the task; [`EventStream::close`] is the
/// graceful path and is idempotent.
pub struct EventStream {
    control: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Spawn a connection to the given pipe path.
    ///
    /// Must be called within a tokio runtime. Returns the handle and the
    /// message channel; the first message is always a
    /// [`StreamMessage::Status`] of `Connecting`.
    pub fn spawn(path: impl Into<PathBuf>) -> (Self, mpsc::Receiver<StreamMessage>) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_BUFFER);
        let (control, control_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_connection(path.into(), tx, control_rx));
        (Self { control, task }, rx)
    }

    /// Point the stream at a different pipe, resetting the attempt counter
    /// as if freshly constructed. Used on session switches.
    pub async fn switch_fifo(&self, path: impl Into<PathBuf>) {
        let _ = self.control.send(Command::Switch(path.into())).await;
    }

    /// Close the stream: stops timers, releases the handle, and emits a
    /// final `Disconnected` status. Safe to call more than once.
    pub async fn close(&self) {
        let _ = self.control.send(Command::Close).await;
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Delay before reconnect attempt `attempt` (1-based).
pub(crate) fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let ms = RECONNECT_BASE_MS as f64 * RECONNECT_MULTIPLIER.powi(exponent);
    Duration::from_millis(ms.min(RECONNECT_MAX_MS as f64) as u64)
}

/// Suppresses identical `(code, message)` pairs within the dedup window.
#[derive(Default)]
struct ErrorDedup {
    last_key: Option<(ErrorCode, String)>,
    last_at: Option<Instant>,
}

impl ErrorDedup {
    fn should_emit(&mut self, error: &DecodeError) -> bool {
        let now = Instant::now();
        let key = (error.code, error.message.clone());
        if let (Some(last_key), Some(last_at)) = (&self.last_key, self.last_at)
            && *last_key == key
            && now.duration_since(last_at) < PARSE_ERROR_DEDUP_WINDOW
        {
            return false;
        }
        self.last_key = Some(key);
        self.last_at = Some(now);
        true
    }
}

/// Emits status transitions, deduplicating repeats.
struct StatusReporter {
    tx: mpsc::Sender<StreamMessage>,
    current: Option<ConnectionStatus>,
}

impl StatusReporter {
    fn new(tx: mpsc::Sender<StreamMessage>) -> Self {
        Self { tx, current: None }
    }

    /// Returns false once the consumer is gone.
    async fn set(&mut self, status: ConnectionStatus) -> bool {
        if self.current == Some(status) {
            return true;
        }
        self.current = Some(status);
        self.tx.send(StreamMessage::Status(status)).await.is_ok()
    }
}

enum Flow {
    Reconnect,
    Stop,
}

async fn run_connection(
    mut path: PathBuf,
    tx: mpsc::Sender<StreamMessage>,
    mut ctl: mpsc::Receiver<Command>,
) {
    let mut reporter = StatusReporter::new(tx.clone());
    let mut dedup = ErrorDedup::default();
    let mut attempts: u32 = 0;

    'reconnect: loop {
        if !reporter.set(ConnectionStatus::Connecting).await {
            return;
        }

        // Waiting-for-producer sub-state: the path not existing is not a
        // failure, so poll without consuming reconnect attempts.
        while !path.exists() {
            tokio::select! {
                cmd = ctl.recv() => match cmd {
                    Some(Command::Switch(new_path)) => {
                        path = new_path;
                        attempts = 0;
                        continue 'reconnect;
                    }
                    Some(Command::Close) | None => {
                        let _ = reporter.set(ConnectionStatus::Disconnected).await;
                        return;
                    }
                },
                _ = sleep(PIPE_WAIT_POLL) => {}
            }
        }

        let source = match open_source(&path).await {
            Ok(source) => source,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to open event stream");
                if !reporter.set(ConnectionStatus::Error).await {
                    return;
                }
                match wait_reconnect(&mut attempts, &mut path, &mut ctl, &mut reporter).await {
                    Flow::Reconnect => continue 'reconnect,
                    Flow::Stop => return,
                }
            }
        };

        if !reporter.set(ConnectionStatus::Connected).await {
            return;
        }
        attempts = 0;
        debug!(path = %path.display(), "event stream connected");

        let mut lines = BufReader::new(source).lines();
        loop {
            tokio::select! {
                cmd = ctl.recv() => match cmd {
                    Some(Command::Switch(new_path)) => {
                        path = new_path;
                        attempts = 0;
                        continue 'reconnect;
                    }
                    Some(Command::Close) | None => {
                        let _ = reporter.set(ConnectionStatus::Disconnected).await;
                        return;
                    }
                },
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if !forward_line(&line, &tx, &mut dedup).await {
                            return;
                        }
                    }
                    Ok(None) => {
                        debug!(path = %path.display(), "event stream ended");
                        if !reporter.set(ConnectionStatus::Disconnected).await {
                            return;
                        }
                        match wait_reconnect(&mut attempts, &mut path, &mut ctl, &mut reporter).await {
                            Flow::Reconnect => continue 'reconnect,
                            Flow::Stop => return,
                        }
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "event stream read error");
                        if !reporter.set(ConnectionStatus::Error).await {
                            return;
                        }
                        match wait_reconnect(&mut attempts, &mut path, &mut ctl, &mut reporter).await {
                            Flow::Reconnect => continue 'reconnect,
                            Flow::Stop => return,
                        }
                    }
                }
            }
        }
    }
}

/// Open the stream source. Prefers a true pipe receiver; falls back to a
/// plain file when the path is not a FIFO.
async fn open_source(path: &Path) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
    use tokio::net::unix::pipe;

    match pipe::OpenOptions::new().read_write(true).open_receiver(path) {
        Ok(receiver) => Ok(Box::new(receiver)),
        Err(err) if err.kind() == io::ErrorKind::InvalidInput => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(file))
        }
        Err(err) => Err(err),
    }
}

/// Decode one raw line and forward the result. A bad line never closes the
/// connection. Returns false once the consumer is gone.
async fn forward_line(
    line: &str,
    tx: &mpsc::Sender<StreamMessage>,
    dedup: &mut ErrorDedup,
) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }

    match decode(line) {
        Ok(decoded) => {
            if let Some(warning) = decoded.warning {
                warn!(code = %warning.code, "event decoded with warning");
                if dedup.should_emit(&warning)
                    && tx.send(StreamMessage::ParseError(warning)).await.is_err()
                {
                    return false;
                }
            }
            tx.send(StreamMessage::Event(Box::new(decoded.event)))
                .await
                .is_ok()
        }
        Err(err) => {
            warn!(error = %err, "failed to decode event line");
            if dedup.should_emit(&err) {
                tx.send(StreamMessage::ParseError(err)).await.is_ok()
            } else {
                true
            }
        }
    }
}

/// Wait out the backoff delay (or the attempt ceiling) before reconnecting.
async fn wait_reconnect(
    attempts: &mut u32,
    path: &mut PathBuf,
    ctl: &mut mpsc::Receiver<Command>,
    reporter: &mut StatusReporter,
) -> Flow {
    if *attempts >= MAX_RECONNECT_ATTEMPTS {
        // Ceiling exhausted: no further retries. Only a switch revives us.
        if !reporter.set(ConnectionStatus::Error).await {
            return Flow::Stop;
        }
        loop {
            match ctl.recv().await {
                Some(Command::Switch(new_path)) => {
                    *path = new_path;
                    *attempts = 0;
                    return Flow::Reconnect;
                }
                Some(Command::Close) | None => {
                    let _ = reporter.set(ConnectionStatus::Disconnected).await;
                    return Flow::Stop;
                }
            }
        }
    }

    *attempts += 1;
    tokio::select! {
        cmd = ctl.recv() => match cmd {
            Some(Command::Switch(new_path)) => {
                *path = new_path;
                *attempts = 0;
                Flow::Reconnect
            }
            Some(Command::Close) | None => {
                let _ = reporter.set(ConnectionStatus::Disconnected).await;
                Flow::Stop
            }
        },
        _ = sleep(reconnect_delay(*attempts)) => Flow::Reconnect,
    }
}
