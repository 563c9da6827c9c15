//! Published state types.
//!
//! [`HudState`] is the single snapshot the UI consumes. It is built by the
//! store, published as `Arc<HudState>`, and never mutated after publication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hud_context::{ContextHealth, CostEstimate};
use hud_core::ErrorCode;
use hud_events::ConnectionStatus;

use crate::readers::{ContextFiles, HudConfig, SettingsData};

/// Tool/agent entries kept for display; older entries roll off.
pub const MAX_TOOL_ENTRIES: usize = 50;
pub const MAX_AGENT_ENTRIES: usize = 50;

/// Errors kept in the published list; oldest dropped first.
pub const MAX_ERROR_ENTRIES: usize = 20;

/// Lifecycle status of a tool or agent entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Running,
    Completed,
    Error,
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One tracked tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolEntry {
    /// Correlation id (the event's toolUseId)
    pub id: String,
    pub name: String,
    /// Human-readable summary of the tool's argument
    pub target: Option<String>,
    pub status: EntryStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ToolEntry {
    /// Wall time from start to finish, if finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|ended| ended - self.started_at)
    }
}

/// One tracked sub-agent dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct AgentEntry {
    pub id: String,
    pub agent_type: String,
    pub model: Option<String>,
    pub description: Option<String>,
    pub status: EntryStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Todo progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

/// One todo item; the list is wholesale-replaced on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

/// Session identity and context carried by events.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub permission_mode: String,
    pub cwd: String,
    pub transcript_path: String,
    pub is_idle: bool,
}

impl SessionInfo {
    pub fn new(session_id: impl Into<String>, transcript_path: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            permission_mode: "default".to_string(),
            cwd: String::new(),
            transcript_path: transcript_path.into(),
            is_idle: true,
        }
    }
}

/// Coarse phase for the UI header, derived from connection status plus
/// prompt/stop activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Connecting,
    Connected,
    Idle,
    Active,
    Disconnected,
    Error,
}

/// One entry of the bounded error list.
#[derive(Debug, Clone, Serialize)]
pub struct HudErrorEntry {
    pub code: ErrorCode,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// The published aggregate. Owned exclusively by the store; the UI only
/// ever sees immutable snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct HudState {
    pub tools: Vec<ToolEntry>,
    pub agents: Vec<AgentEntry>,
    pub todos: Vec<TodoItem>,
    pub context: ContextHealth,
    pub connection_status: ConnectionStatus,
    pub session_phase: SessionPhase,
    pub session: SessionInfo,
    pub settings: Option<SettingsData>,
    pub context_files: Option<ContextFiles>,
    pub config: Option<HudConfig>,
    pub cost: CostEstimate,
    pub model: Option<String>,
    pub errors: Vec<HudErrorEntry>,
    pub now: DateTime<Utc>,
}
