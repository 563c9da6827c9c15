//! The HUD store: one stream, one tracker, one published snapshot.
//!
//! A single driver task consumes the stream and refresh channels, mutates
//! internal state synchronously per message, and republishes an immutable
//! `Arc<HudState>` through a watch channel after every mutation. Consumers
//! never observe a half-applied update, and no lock is involved: the driver
//! is the only owner of mutable state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use hud_context::ContextTracker;
use hud_core::{system_clock, ErrorCode, SharedClock};
use hud_events::{ConnectionStatus, EventStream, HudEvent, HudEventKind, StreamMessage};

use crate::readers::{ContextFilesDetector, HudConfigReader, SettingsReader};
use crate::refresh::{read_handoff, RefreshWatcher, RefreshWatcherConfig, SessionHandoff};
use crate::state::{
    AgentEntry, EntryStatus, HudErrorEntry, HudState, SessionInfo, SessionPhase, TodoItem,
    ToolEntry, MAX_AGENT_ENTRIES, MAX_ERROR_ENTRIES, MAX_TOOL_ENTRIES,
};

/// Configuration for a [`HudStore`].
pub struct HudStoreConfig {
    /// Path of the event FIFO
    pub fifo_path: PathBuf,
    /// Session id, when already known at startup
    pub session_id: Option<String>,
    /// Transcript path, when already known at startup
    pub transcript_path: Option<PathBuf>,
    /// Refresh file to watch for session handoffs
    pub refresh_path: Option<PathBuf>,
    /// Settings file override (defaults to `~/.claude/settings.json`)
    pub settings_path: Option<PathBuf>,
    /// HUD config override (defaults to `~/.claude/hud/config.json`)
    pub hud_config_path: Option<PathBuf>,
    /// Home directory override for context-file detection
    pub home_dir: Option<PathBuf>,
    /// Clock override (tests)
    pub clock: Option<SharedClock>,
}

impl HudStoreConfig {
    pub fn new(fifo_path: impl Into<PathBuf>) -> Self {
        Self {
            fifo_path: fifo_path.into(),
            session_id: None,
            transcript_path: None,
            refresh_path: None,
            settings_path: None,
            hud_config_path: None,
            home_dir: None,
            clock: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript_path = Some(path.into());
        self
    }

    pub fn with_refresh_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn with_hud_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.hud_config_path = Some(path.into());
        self
    }

    pub fn with_home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(path.into());
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }
}

/// Commands from the handle to the driver task.
enum StoreCommand {
    SwitchSession(SessionHandoff),
    ReloadSessionFile,
    Dispose,
}

/// Handle to the running store.
///
/// `state()` is always valid, including before the first event arrives.
/// Dropping the handle aborts the driver; [`HudStore::dispose`] is the
/// graceful, idempotent path.
pub struct HudStore {
    control: mpsc::Sender<StoreCommand>,
    state_rx: watch::Receiver<Arc<HudState>>,
    driver: JoinHandle<()>,
}

impl HudStore {
    /// Spawn the store and its stream connection. Must be called within a
    /// tokio runtime.
    pub fn spawn(config: HudStoreConfig) -> Self {
        let clock = config.clock.clone().unwrap_or_else(system_clock);
        let home = config
            .home_dir
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        let settings_path = config
            .settings_path
            .clone()
            .or_else(SettingsReader::default_path)
            .unwrap_or_else(|| home.join(".claude").join("settings.json"));
        let hud_config_path = config
            .hud_config_path
            .clone()
            .or_else(HudConfigReader::default_path)
            .unwrap_or_else(|| home.join(".claude").join("hud").join("config.json"));

        let mut tracker = ContextTracker::with_clock(clock.clone());
        if let Some(path) = &config.transcript_path {
            tracker.set_transcript_path(path);
        }

        let inner = StoreInner {
            clock: clock.clone(),
            tracker,
            settings: SettingsReader::new(settings_path, clock.clone()),
            context_files: ContextFilesDetector::new(home, clock.clone()),
            hud_config: HudConfigReader::new(hud_config_path, clock),
            connection_status: ConnectionStatus::Connecting,
            session: SessionInfo::new(
                config.session_id.clone().unwrap_or_default(),
                config
                    .transcript_path
                    .as_deref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
            saw_activity: false,
            tools: Vec::new(),
            agents: Vec::new(),
            todos: Vec::new(),
            errors: Vec::new(),
        };

        let (stream, stream_rx) = EventStream::spawn(&config.fifo_path);

        let refresh = config.refresh_path.clone().map(|path| {
            let (watcher, rx) = RefreshWatcher::spawn(RefreshWatcherConfig::new(path));
            (watcher, rx)
        });

        let (control, control_rx) = mpsc::channel(8);
        let (state_tx, state_rx) = watch::channel(inner_initial_state(&inner));

        let driver = tokio::spawn(run_store(
            inner,
            stream,
            stream_rx,
            refresh,
            config.refresh_path,
            config.fifo_path,
            control_rx,
            state_tx,
        ));

        Self {
            control,
            state_rx,
            driver,
        }
    }

    /// Latest snapshot, synchronously.
    pub fn state(&self) -> Arc<HudState> {
        self.state_rx.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<HudState>> {
        self.state_rx.clone()
    }

    /// Switch to a different underlying session.
    pub async fn switch_session(&self, handoff: SessionHandoff) {
        let _ = self
            .control
            .send(StoreCommand::SwitchSession(handoff))
            .await;
    }

    /// Re-read the refresh file immediately (signal handlers call this).
    pub async fn reload_session_file(&self) {
        let _ = self.control.send(StoreCommand::ReloadSessionFile).await;
    }

    /// Stop the stream, the watcher, and the driver. Idempotent.
    pub async fn dispose(&self) {
        let _ = self.control.send(StoreCommand::Dispose).await;
    }
}

impl Drop for HudStore {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn inner_initial_state(inner: &StoreInner) -> Arc<HudState> {
    Arc::new(HudState {
        tools: Vec::new(),
        agents: Vec::new(),
        todos: Vec::new(),
        context: inner.tracker.health(),
        connection_status: inner.connection_status,
        session_phase: SessionPhase::Connecting,
        session: inner.session.clone(),
        settings: None,
        context_files: None,
        config: None,
        cost: inner.tracker.cost(),
        model: None,
        errors: Vec::new(),
        now: inner.clock.now(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_store(
    mut inner: StoreInner,
    stream: EventStream,
    stream_rx: mpsc::Receiver<StreamMessage>,
    refresh: Option<(RefreshWatcher, mpsc::Receiver<SessionHandoff>)>,
    refresh_path: Option<PathBuf>,
    mut current_fifo: PathBuf,
    mut control_rx: mpsc::Receiver<StoreCommand>,
    state_tx: watch::Sender<Arc<HudState>>,
) {
    let (_refresh_watcher, mut refresh_rx) = match refresh {
        Some((watcher, rx)) => (Some(watcher), Some(rx)),
        None => (None, None),
    };
    let mut stream_rx = Some(stream_rx);

    loop {
        tokio::select! {
            cmd = control_rx.recv() => match cmd {
                Some(StoreCommand::SwitchSession(handoff)) => {
                    apply_handoff(&mut inner, &stream, &mut current_fifo, handoff).await;
                }
                Some(StoreCommand::ReloadSessionFile) => {
                    if let Some(path) = &refresh_path {
                        match read_handoff(path) {
                            Ok(handoff) => {
                                apply_handoff(&mut inner, &stream, &mut current_fifo, handoff).await;
                            }
                            Err(err) => {
                                if let Some(code) = err.code() {
                                    inner.push_error(code, err.to_string());
                                }
                            }
                        }
                    }
                }
                Some(StoreCommand::Dispose) | None => break,
            },
            msg = next_message(&mut stream_rx) => {
                if let Some(msg) = msg {
                    inner.apply_message(msg);
                }
            },
            handoff = next_message(&mut refresh_rx) => {
                if let Some(handoff) = handoff {
                    apply_handoff(&mut inner, &stream, &mut current_fifo, handoff).await;
                }
            }
        }

        let _ = state_tx.send(inner.build_state());
    }

    // graceful teardown: no callback mutates state past this point
    stream.close().await;
    inner.connection_status = ConnectionStatus::Disconnected;
    let _ = state_tx.send(inner.build_state());
}

/// Receive from an optional channel; a missing or closed channel pends
/// forever instead of busy-returning `None`.
async fn next_message<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    let message = receiver.recv().await;
    if message.is_none() {
        *rx = None;
    }
    message
}

/// Adopt a session handoff: re-point the stream, the tracker, and the
/// per-session state.
async fn apply_handoff(
    inner: &mut StoreInner,
    stream: &EventStream,
    current_fifo: &mut PathBuf,
    handoff: SessionHandoff,
) {
    debug!(session = %handoff.session_id, fifo = %handoff.fifo_path.display(), "session handoff");

    if !handoff.session_id.is_empty() && handoff.session_id != inner.session.session_id {
        inner.reset_session_state(handoff.session_id.clone());
    }
    if let Some(transcript) = &handoff.transcript_path {
        inner.session.transcript_path = transcript.to_string_lossy().into_owned();
        inner.tracker.set_transcript_path(transcript);
    }
    if handoff.fifo_path != *current_fifo {
        stream.switch_fifo(&handoff.fifo_path).await;
        *current_fifo = handoff.fifo_path;
    }
}

/// All mutable store state; mutated only by the driver task, one message at
/// a time.
struct StoreInner {
    clock: SharedClock,
    tracker: ContextTracker,
    settings: SettingsReader,
    context_files: ContextFilesDetector,
    hud_config: HudConfigReader,
    connection_status: ConnectionStatus,
    session: SessionInfo,
    saw_activity: bool,
    tools: Vec<ToolEntry>,
    agents: Vec<AgentEntry>,
    todos: Vec<TodoItem>,
    errors: Vec<HudErrorEntry>,
}

impl StoreInner {
    fn apply_message(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Status(status) => {
                self.connection_status = status;
            }
            StreamMessage::Event(event) => self.apply_event(*event),
            StreamMessage::ParseError(err) => self.push_error(err.code, err.message),
        }
    }

    fn apply_event(&mut self, event: HudEvent) {
        if !event.session.is_empty() {
            if self.session.session_id.is_empty() {
                self.session.session_id = event.session.clone();
            } else if self.session.session_id != event.session {
                self.reset_session_state(event.session.clone());
            }
        }
        if let Some(mode) = &event.permission_mode {
            self.session.permission_mode = mode.clone();
        }
        if let Some(cwd) = &event.cwd {
            self.session.cwd = cwd.clone();
        }
        if let Some(path) = &event.transcript_path {
            self.session.transcript_path = path.clone();
        }

        match event.kind {
            HudEventKind::PreToolUse => {
                self.saw_activity = true;
                self.session.is_idle = false;
                if event.is_agent_dispatch() {
                    self.start_agent(&event);
                } else {
                    self.start_tool(&event);
                }
            }
            HudEventKind::PostToolUse => {
                self.saw_activity = true;
                if event.tool_name() == Some("TodoWrite")
                    && let Some(input) = &event.input
                    && let Some(todos) = todos_from_input(input)
                {
                    // last snapshot wins, no diffing
                    self.todos = todos;
                }
                if event.is_agent_dispatch() {
                    self.finish_agent(&event);
                } else {
                    self.finish_tool(&event);
                }
            }
            HudEventKind::UserPromptSubmit => {
                self.saw_activity = true;
                self.session.is_idle = false;
            }
            HudEventKind::Stop => {
                self.session.is_idle = true;
            }
            HudEventKind::PreCompact => {}
        }

        self.tracker.process_event(&event);
    }

    fn start_tool(&mut self, event: &HudEvent) {
        let id = entry_id(event);
        // a replayed source can deliver the same start twice
        if self.tools.iter().any(|tool| tool.id == id) {
            return;
        }
        self.tools.push(ToolEntry {
            id,
            name: event.tool_name().unwrap_or("unknown").to_string(),
            target: event.target_hint(),
            status: EntryStatus::Running,
            started_at: self.event_time(event),
            ended_at: None,
        });
        if self.tools.len() > MAX_TOOL_ENTRIES {
            let cut = self.tools.len() - MAX_TOOL_ENTRIES;
            self.tools.drain(..cut);
        }
    }

    fn finish_tool(&mut self, event: &HudEvent) {
        let Some(id) = event.tool_use_id.as_deref() else {
            return;
        };
        let ended_at = self.event_time(event);
        match self
            .tools
            .iter_mut()
            .rev()
            .find(|tool| tool.id == id && tool.status == EntryStatus::Running)
        {
            Some(entry) => {
                entry.status = result_status(event);
                entry.ended_at = Some(ended_at);
            }
            // unmatched results are dropped; see the unmatched-result policy
            None => trace!(tool_use_id = id, "unmatched tool result dropped"),
        }
    }

    fn start_agent(&mut self, event: &HudEvent) {
        let id = entry_id(event);
        if self.agents.iter().any(|agent| agent.id == id) {
            return;
        }
        let input = event.input.as_ref();
        self.agents.push(AgentEntry {
            id,
            agent_type: input
                .and_then(|i| i.get("subagent_type"))
                .and_then(Value::as_str)
                .unwrap_or("agent")
                .to_string(),
            model: input
                .and_then(|i| i.get("model"))
                .and_then(Value::as_str)
                .map(str::to_string),
            description: input
                .and_then(|i| i.get("description"))
                .and_then(Value::as_str)
                .map(str::to_string),
            status: EntryStatus::Running,
            started_at: self.event_time(event),
            ended_at: None,
        });
        if self.agents.len() > MAX_AGENT_ENTRIES {
            let cut = self.agents.len() - MAX_AGENT_ENTRIES;
            self.agents.drain(..cut);
        }
    }

    fn finish_agent(&mut self, event: &HudEvent) {
        let Some(id) = event.tool_use_id.as_deref() else {
            return;
        };
        let ended_at = self.event_time(event);
        match self
            .agents
            .iter_mut()
            .rev()
            .find(|agent| agent.id == id && agent.status == EntryStatus::Running)
        {
            Some(entry) => {
                entry.status = result_status(event);
                entry.ended_at = Some(ended_at);
            }
            None => trace!(tool_use_id = id, "unmatched agent result dropped"),
        }
    }

    fn push_error(&mut self, code: ErrorCode, message: String) {
        // identical entries would only repeat what the list already shows
        if self
            .errors
            .iter()
            .any(|e| e.code == code && e.message == message)
        {
            return;
        }
        self.errors.push(HudErrorEntry {
            code,
            message,
            at: self.clock.now(),
        });
        if self.errors.len() > MAX_ERROR_ENTRIES {
            let cut = self.errors.len() - MAX_ERROR_ENTRIES;
            self.errors.drain(..cut);
        }
    }

    /// Tear down per-session state when the session id changes.
    fn reset_session_state(&mut self, new_session: String) {
        debug!(session = %new_session, "session changed, resetting per-session state");
        self.tools.clear();
        self.agents.clear();
        self.todos.clear();
        self.tracker.reset();
        self.saw_activity = false;
        self.session = SessionInfo::new(new_session, String::new());
    }

    fn session_phase(&self) -> SessionPhase {
        match self.connection_status {
            ConnectionStatus::Connecting => SessionPhase::Connecting,
            ConnectionStatus::Disconnected => SessionPhase::Disconnected,
            ConnectionStatus::Error => SessionPhase::Error,
            ConnectionStatus::Connected => {
                if !self.saw_activity {
                    SessionPhase::Connected
                } else if self.session.is_idle {
                    SessionPhase::Idle
                } else {
                    SessionPhase::Active
                }
            }
        }
    }

    fn event_time(&self, event: &HudEvent) -> DateTime<Utc> {
        if event.ts > 0 {
            DateTime::from_timestamp(event.ts, 0).unwrap_or_else(|| self.clock.now())
        } else {
            self.clock.now()
        }
    }

    /// Build the next snapshot. Cached readers do their lazy TTL check
    /// here; their advisory errors land in the bounded error list.
    fn build_state(&mut self) -> Arc<HudState> {
        let settings = self.settings.read();
        if let Some(err) = settings.error.clone() {
            self.push_error(ErrorCode::ConfigReadError, err);
        }

        let cwd = (!self.session.cwd.is_empty()).then(|| PathBuf::from(&self.session.cwd));
        let context_files = self.context_files.detect(cwd.as_deref());

        let config = self.hud_config.read();
        if let Some(err) = config.error.clone() {
            self.push_error(ErrorCode::ConfigReadError, err);
        }

        Arc::new(HudState {
            tools: self.tools.clone(),
            agents: self.agents.clone(),
            todos: self.todos.clone(),
            context: self.tracker.health(),
            connection_status: self.connection_status,
            session_phase: self.session_phase(),
            session: self.session.clone(),
            settings: settings.data,
            context_files: Some(context_files),
            config: config.data,
            cost: self.tracker.cost(),
            model: self.tracker.model().map(str::to_string),
            errors: self.errors.clone(),
            now: self.clock.now(),
        })
    }
}

/// Stable id for correlating start/result pairs.
fn entry_id(event: &HudEvent) -> String {
    event.tool_use_id.clone().unwrap_or_else(|| {
        format!("{}-{}", event.tool_name().unwrap_or("unknown"), event.ts)
    })
}

/// A result is an error when the response says so.
fn result_status(event: &HudEvent) -> EntryStatus {
    let is_error = event.response.as_ref().is_some_and(|response| {
        response
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false)
            || response.get("error").is_some_and(|e| !e.is_null())
    });
    if is_error {
        EntryStatus::Error
    } else {
        EntryStatus::Completed
    }
}

/// Extract the wholesale todo list from a TodoWrite input.
fn todos_from_input(input: &Value) -> Option<Vec<TodoItem>> {
    let items = input.get("todos")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
    )
}
