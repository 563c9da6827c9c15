//! # claude-hud
//!
//! Live session ingestion and context-health engine for AI coding
//! assistant HUDs. The engine maintains a resilient connection to the host
//! process's event FIFO, incrementally reconstructs token usage from the
//! session transcript, and publishes one consistent [`HudState`] snapshot
//! per change for a UI layer to render.
//!
//! ## Quick start
//!
//! ```no_run
//! use claude_hud::{HudStore, HudStoreConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let _guard = claude_hud::init_logging(None, false).expect("logging init");
//!
//!     let store = HudStore::spawn(
//!         HudStoreConfig::new("/tmp/claude-hud.fifo")
//!             .with_refresh_file("/tmp/claude-hud-refresh.json"),
//!     );
//!
//!     let mut updates = store.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let state = updates.borrow().clone();
//!         tracing::info!(
//!             tokens = state.context.tokens,
//!             percent = state.context.percent,
//!             status = ?state.connection_status,
//!             "hud state updated"
//!         );
//!     }
//! }
//! ```

pub use hud_context::{
    context_limit, ContextBreakdown, ContextHealth, ContextTracker, CostEstimate, HealthStatus,
};
pub use hud_core::{init_logging, Clock, ErrorCode, HudError, LogGuard, SystemClock};
pub use hud_events::{
    decode, ConnectionStatus, DecodeError, Decoded, EventStream, HudEvent, HudEventKind,
    StreamMessage, HUD_EVENT_SCHEMA_VERSION,
};
pub use hud_store::{
    AgentEntry, ContextFiles, EntryStatus, HudConfig, HudState, HudStore, HudStoreConfig,
    SessionHandoff, SessionInfo, SessionPhase, SettingsData, TodoItem, TodoStatus, ToolEntry,
};
