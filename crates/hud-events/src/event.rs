//! The HUD event protocol.
//!
//! The host process writes newline-delimited JSON events to a named pipe;
//! this module defines the decoded shape. Payloads (`input`/`response`) are
//! kept as raw [`serde_json::Value`]s of arbitrary size - truncation for
//! display is the UI layer's concern, never the protocol's.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version this build understands. Events carrying a newer version
/// are still decoded best-effort, with a warning attached.
pub const HUD_EVENT_SCHEMA_VERSION: u32 = 1;

/// Hook points the host process reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HudEventKind {
    /// A tool invocation is about to run
    PreToolUse,
    /// A tool invocation finished (response attached)
    PostToolUse,
    /// The user submitted a prompt
    UserPromptSubmit,
    /// The assistant turn ended
    Stop,
    /// The host is about to compact the context window
    PreCompact,
}

/// A single decoded event from the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HudEvent {
    /// Protocol version the producer wrote
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Which hook fired
    #[serde(rename = "event")]
    pub kind: HudEventKind,
    /// Tool name for tool events
    #[serde(default)]
    pub tool: Option<String>,
    /// Correlates PreToolUse with its PostToolUse result
    #[serde(default)]
    pub tool_use_id: Option<String>,
    /// Tool input payload, verbatim
    #[serde(default)]
    pub input: Option<Value>,
    /// Tool response payload, verbatim
    #[serde(default)]
    pub response: Option<Value>,
    /// Session identifier (required)
    pub session: String,
    /// Unix seconds at emission
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    /// Prompt text for UserPromptSubmit
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_schema_version() -> u32 {
    HUD_EVENT_SCHEMA_VERSION
}

/// Input keys probed for a human-readable argument summary, most specific
/// first.
const TARGET_KEYS: &[&str] = &[
    "file_path",
    "path",
    "command",
    "pattern",
    "query",
    "url",
    "description",
];

impl HudEvent {
    /// Tool name, if this is a tool event.
    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_deref()
    }

    /// A short human-readable summary of the tool's argument, pulled from
    /// well-known input keys. Returns the raw value; truncation is left to
    /// the UI.
    pub fn target_hint(&self) -> Option<String> {
        let input = self.input.as_ref()?.as_object()?;
        TARGET_KEYS
            .iter()
            .find_map(|key| input.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }

    /// Returns true if this event dispatches a sub-agent.
    pub fn is_agent_dispatch(&self) -> bool {
        self.tool.as_deref() == Some("Task")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with_input(input: Value) -> HudEvent {
        HudEvent {
            schema_version: HUD_EVENT_SCHEMA_VERSION,
            kind: HudEventKind::PreToolUse,
            tool: Some("Read".to_string()),
            tool_use_id: Some("tool-1".to_string()),
            input: Some(input),
            response: None,
            session: "s".to_string(),
            ts: 0,
            permission_mode: None,
            cwd: None,
            transcript_path: None,
            prompt: None,
        }
    }

    #[test]
    fn test_target_hint_prefers_file_path() {
        let event = event_with_input(json!({
            "file_path": "/src/main.rs",
            "description": "read the entry point",
        }));
        assert_eq!(event.target_hint().as_deref(), Some("/src/main.rs"));
    }

    #[test]
    fn test_target_hint_falls_back_to_command() {
        let event = event_with_input(json!({"command": "cargo fmt"}));
        assert_eq!(event.target_hint().as_deref(), Some("cargo fmt"));
    }

    #[test]
    fn test_target_hint_none_without_known_keys() {
        let event = event_with_input(json!({"todos": []}));
        assert_eq!(event.target_hint(), None);
    }

    #[test]
    fn test_agent_dispatch() {
        let mut event = event_with_input(json!({"description": "explore"}));
        assert!(!event.is_agent_dispatch());
        event.tool = Some("Task".to_string());
        assert!(event.is_agent_dispatch());
    }
}
