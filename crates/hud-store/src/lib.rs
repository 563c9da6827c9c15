//! # hud-store
//!
//! The aggregation layer of the HUD engine:
//! - [`HudStore`] - owns the stream, the tracker, and the cached readers;
//!   publishes immutable [`HudState`] snapshots
//! - [`readers`] - TTL-cached settings/context-files/display-config readers
//! - [`refresh`] - session handoff file parsing and watching

pub mod readers;
pub mod refresh;
pub mod state;
pub mod store;

pub use readers::{
    ContextFiles, ContextFilesDetector, HudConfig, HudConfigReader, PanelId, ReadOutcome,
    SettingsData, SettingsReader, READER_TTL_SECS,
};
pub use refresh::{read_handoff, RefreshWatcher, RefreshWatcherConfig, SessionHandoff};
pub use state::{
    AgentEntry, EntryStatus, HudErrorEntry, HudState, SessionInfo, SessionPhase, TodoItem,
    TodoStatus, ToolEntry, MAX_ERROR_ENTRIES, MAX_TOOL_ENTRIES,
};
pub use store::{HudStore, HudStoreConfig};
