//! Pure line decoder for the event protocol.
//!
//! `decode` never does I/O and never panics: a line either becomes a
//! [`HudEvent`] (possibly with a schema-version warning attached) or a
//! classified [`DecodeError`]. The stream keeps running either way.

use hud_core::ErrorCode;
use thiserror::Error;

use crate::event::{HudEvent, HUD_EVENT_SCHEMA_VERSION};

/// A classified decode failure or warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct DecodeError {
    pub code: ErrorCode,
    pub message: String,
}

impl DecodeError {
    fn parse_failed(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::EventParseFailed,
            message: message.into(),
        }
    }

    fn schema_mismatch(found: u32) -> Self {
        Self {
            code: ErrorCode::SchemaVersionMismatch,
            message: format!(
                "event schema version {found} is newer than supported {HUD_EVENT_SCHEMA_VERSION}"
            ),
        }
    }
}

/// A successfully decoded line.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub event: HudEvent,
    /// Present when the event decoded but came from a newer protocol version.
    pub warning: Option<DecodeError>,
}

/// Decode one stream line into an event.
///
/// Requires valid JSON with `event` and `session` fields. Versions newer
/// than [`HUD_EVENT_SCHEMA_VERSION`] are accepted best-effort with a
/// `schema_version_mismatch` warning.
pub fn decode(line: &str) -> Result<Decoded, DecodeError> {
    let event: HudEvent =
        serde_json::from_str(line).map_err(|e| DecodeError::parse_failed(e.to_string()))?;

    let warning = (event.schema_version > HUD_EVENT_SCHEMA_VERSION)
        .then(|| DecodeError::schema_mismatch(event.schema_version));

    Ok(Decoded { event, warning })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::HudEventKind;
    use serde_json::json;

    fn line(value: serde_json::Value) -> String {
        value.to_string()
    }

    #[test]
    fn test_decode_post_tool_use() {
        let line = line(json!({
            "schemaVersion": 1,
            "event": "PostToolUse",
            "tool": "Read",
            "input": {"file_path": "/test.rs"},
            "response": {"content": "file content"},
            "session": "test-session",
            "ts": 1234567890,
        }));

        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.event.kind, HudEventKind::PostToolUse);
        assert_eq!(decoded.event.tool.as_deref(), Some("Read"));
        assert!(decoded.warning.is_none());
    }

    #[test]
    fn test_decode_pre_tool_use_with_id() {
        let line = line(json!({
            "schemaVersion": 1,
            "event": "PreToolUse",
            "tool": "Write",
            "toolUseId": "tool-123",
            "input": {"file_path": "/test.rs", "content": "new content"},
            "response": null,
            "session": "test-session",
            "ts": 1234567890,
        }));

        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.event.kind, HudEventKind::PreToolUse);
        assert_eq!(decoded.event.tool_use_id.as_deref(), Some("tool-123"));
    }

    #[test]
    fn test_decode_user_prompt_submit() {
        let line = line(json!({
            "schemaVersion": 1,
            "event": "UserPromptSubmit",
            "tool": null,
            "input": null,
            "response": null,
            "session": "test-session",
            "ts": 1234567890,
            "prompt": "Help me fix this bug",
        }));

        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.event.kind, HudEventKind::UserPromptSubmit);
        assert_eq!(decoded.event.prompt.as_deref(), Some("Help me fix this bug"));
    }

    #[test]
    fn test_decode_stop_and_pre_compact() {
        for (name, kind) in [
            ("Stop", HudEventKind::Stop),
            ("PreCompact", HudEventKind::PreCompact),
        ] {
            let line = line(json!({
                "schemaVersion": 1,
                "event": name,
                "session": "test-session",
                "ts": 1234567890,
            }));
            let decoded = decode(&line).unwrap();
            assert_eq!(decoded.event.kind, kind);
        }
    }

    #[test]
    fn test_decode_session_context_fields() {
        let line = line(json!({
            "schemaVersion": 1,
            "event": "PostToolUse",
            "tool": "Read",
            "input": {"file_path": "/test.rs"},
            "response": {"content": "test"},
            "session": "test-session",
            "ts": 1234567890,
            "permissionMode": "plan",
            "cwd": "/home/user/project",
            "transcriptPath": "/tmp/transcript.jsonl",
        }));

        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.event.permission_mode.as_deref(), Some("plan"));
        assert_eq!(decoded.event.cwd.as_deref(), Some("/home/user/project"));
        assert_eq!(
            decoded.event.transcript_path.as_deref(),
            Some("/tmp/transcript.jsonl")
        );
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode("not valid json").unwrap_err();
        assert_eq!(err.code, ErrorCode::EventParseFailed);
    }

    #[test]
    fn test_decode_empty_line() {
        assert!(decode("").is_err());
    }

    #[test]
    fn test_decode_missing_event_field() {
        let line = line(json!({
            "schemaVersion": 1,
            "tool": "Read",
            "session": "test",
            "ts": 123,
        }));
        let err = decode(&line).unwrap_err();
        assert_eq!(err.code, ErrorCode::EventParseFailed);
    }

    #[test]
    fn test_decode_missing_session_field() {
        let line = line(json!({
            "schemaVersion": 1,
            "event": "PostToolUse",
            "tool": "Read",
            "ts": 123,
        }));
        assert!(decode(&line).is_err());
    }

    #[test]
    fn test_decode_unknown_event_kind() {
        let line = line(json!({
            "schemaVersion": 1,
            "event": "SomethingNew",
            "session": "test",
            "ts": 123,
        }));
        let err = decode(&line).unwrap_err();
        assert_eq!(err.code, ErrorCode::EventParseFailed);
    }

    #[test]
    fn test_decode_large_response_preserved() {
        let content = "x".repeat(100_000);
        let line = line(json!({
            "schemaVersion": 1,
            "event": "PostToolUse",
            "tool": "Read",
            "input": {"file_path": "/test.rs"},
            "response": {"content": content},
            "session": "test-session",
            "ts": 1234567890,
        }));

        let decoded = decode(&line).unwrap();
        let response = decoded.event.response.unwrap();
        assert_eq!(
            response.get("content").and_then(|v| v.as_str()).unwrap().len(),
            100_000
        );
    }

    #[test]
    fn test_decode_unicode_preserved() {
        let line = line(json!({
            "schemaVersion": 1,
            "event": "PostToolUse",
            "tool": "Read",
            "input": {"file_path": "/path with spaces/file (1).rs"},
            "response": {"content": "日本語 🎉 émoji"},
            "session": "test-session",
            "ts": 1234567890,
        }));

        let decoded = decode(&line).unwrap();
        assert_eq!(
            decoded.event.target_hint().as_deref(),
            Some("/path with spaces/file (1).rs")
        );
        assert_eq!(
            decoded.event.response.as_ref().unwrap().get("content").unwrap(),
            "日本語 🎉 émoji"
        );
    }

    #[test]
    fn test_decode_newer_schema_version_warns() {
        let line = line(json!({
            "schemaVersion": HUD_EVENT_SCHEMA_VERSION + 1,
            "event": "PostToolUse",
            "tool": "Read",
            "input": {"file_path": "/test.rs"},
            "response": {"content": "file content"},
            "session": "test-session",
            "ts": 1234567890,
        }));

        let decoded = decode(&line).unwrap();
        let warning = decoded.warning.expect("warning expected");
        assert_eq!(warning.code, ErrorCode::SchemaVersionMismatch);
    }

    #[test]
    fn test_decode_missing_schema_version_defaults() {
        let line = line(json!({
            "event": "Stop",
            "session": "test-session",
        }));

        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.event.schema_version, HUD_EVENT_SCHEMA_VERSION);
        assert!(decoded.warning.is_none());
    }
}
