//! Unified context tracking: transcript truth plus live estimates.
//!
//! The transcript is the authority on token usage, but it only gains a new
//! usage record when an assistant turn completes. Between turns the tracker
//! accumulates speculative per-event estimates, and discards them the moment
//! a newer transcript record is read: `tokens = real + estimated_delta`,
//! where the delta resets to zero on every authoritative sync.
//!
//! The transcript file is never re-read from the start. A byte offset and a
//! carried partial-line remainder track the consumed prefix; rotation
//! (file shrinking below the offset) silently restarts from zero.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hud_core::{system_clock, SharedClock};
use hud_events::{HudEvent, HudEventKind};

use crate::limits::context_limit;
use crate::pricing::{CostEstimate, PricingTable};

/// Usage ratio at which the session should compact.
pub const COMPACTION_THRESHOLD: f64 = 0.85;

/// Usage ratio at which health degrades to warning.
pub const WARNING_THRESHOLD: f64 = 0.70;

/// Samples exposed for the sparkline.
pub const SPARKLINE_SAMPLES: usize = 20;

/// Estimation heuristic: roughly four JSON characters per token. A
/// deliberate approximation, not a tokenizer.
pub const CHARS_PER_TOKEN: u64 = 4;

/// History is trimmed back to this many samples...
const HISTORY_KEEP: usize = 50;
/// ...once it grows past this many (batched trim, not a strict ring).
const HISTORY_HIGH_WATER: usize = 100;

/// Burn rate looks at this many most-recent samples.
const BURN_RATE_SAMPLES: usize = 10;

/// Minimum sample span for a meaningful burn rate.
const BURN_RATE_MIN_MINUTES: f64 = 0.1;

/// Context health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Where the consumed tokens went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextBreakdown {
    pub tool_inputs: u64,
    pub tool_outputs: u64,
    pub messages: u64,
    pub other: u64,
}

/// Derived context-health snapshot, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct ContextHealth {
    pub tokens: u64,
    /// Usage percentage, clamped to [0, 100]
    pub percent: u8,
    /// Tokens left in the window, clamped at 0
    pub remaining: u64,
    pub max_tokens: u64,
    /// Tokens per minute over recent history; negative after a compaction
    pub burn_rate: i64,
    pub status: HealthStatus,
    pub should_compact: bool,
    pub breakdown: ContextBreakdown,
    /// Most recent samples, oldest first
    pub token_history: Vec<u64>,
    pub session_start: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Token usage from a transcript assistant record.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct TranscriptUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

impl TranscriptUsage {
    fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens
            + self.cache_read_input_tokens
    }
}

#[derive(Debug, Default, Deserialize)]
struct TranscriptMessage {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<TranscriptUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct TranscriptRecord {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<TranscriptMessage>,
}

#[derive(Debug, Clone, Copy)]
struct TokenSample {
    tokens: u64,
    at: DateTime<Utc>,
}

/// Combines transcript-derived token truth with live event estimates.
pub struct ContextTracker {
    clock: SharedClock,
    pricing: PricingTable,

    transcript_path: Option<PathBuf>,
    transcript_modified: Option<SystemTime>,
    transcript_offset: u64,
    transcript_remainder: Vec<u8>,
    transcript_usage: Option<TranscriptUsage>,

    model: Option<String>,
    real_tokens: u64,
    estimated_delta: u64,
    breakdown: ContextBreakdown,
    token_history: Vec<TokenSample>,
    session_start: DateTime<Utc>,
    last_update: DateTime<Utc>,
    compaction_count: u32,
}

impl ContextTracker {
    /// Create a tracker on the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a tracker with an injected clock (tests).
    pub fn with_clock(clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            clock,
            pricing: PricingTable::new(),
            transcript_path: None,
            transcript_modified: None,
            transcript_offset: 0,
            transcript_remainder: Vec::new(),
            transcript_usage: None,
            model: None,
            real_tokens: 0,
            estimated_delta: 0,
            breakdown: ContextBreakdown::default(),
            token_history: Vec::new(),
            session_start: now,
            last_update: now,
            compaction_count: 0,
        }
    }

    /// Point the tracker at a transcript file. A changed path resets the
    /// incremental read state and reads immediately.
    pub fn set_transcript_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.transcript_path.as_ref() == Some(&path) {
            return;
        }
        self.transcript_path = Some(path);
        self.reset_transcript_state();
        self.read_transcript();
    }

    /// The transcript currently being tracked.
    pub fn transcript_path(&self) -> Option<&Path> {
        self.transcript_path.as_deref()
    }

    /// Latest model name seen in the transcript.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Compactions observed this session.
    pub fn compaction_count(&self) -> u32 {
        self.compaction_count
    }

    /// Feed a live event into the tracker.
    pub fn process_event(&mut self, event: &HudEvent) {
        self.last_update = self.clock.now();

        if let Some(path) = event.transcript_path.as_deref()
            && self.transcript_path.as_deref() != Some(Path::new(path))
        {
            self.set_transcript_path(path);
        }

        match event.kind {
            HudEventKind::PostToolUse => {
                if let Some(input) = &event.input {
                    let tokens = estimate_tokens(input);
                    self.estimated_delta += tokens;
                    self.breakdown.tool_inputs += tokens;
                }
                if let Some(response) = &event.response {
                    let tokens = estimate_tokens(response);
                    self.estimated_delta += tokens;
                    self.breakdown.tool_outputs += tokens;
                }
                self.record_history();
            }
            HudEventKind::Stop => self.read_transcript(),
            HudEventKind::PreCompact => self.compaction_count += 1,
            HudEventKind::PreToolUse | HudEventKind::UserPromptSubmit => {}
        }
    }

    /// Force a transcript sync outside of a `Stop` event.
    pub fn refresh_transcript(&mut self) {
        self.read_transcript();
    }

    /// Current total: transcript truth plus the speculative delta.
    pub fn total_tokens(&self) -> u64 {
        self.real_tokens + self.estimated_delta
    }

    /// Snapshot the current context health.
    pub fn health(&self) -> ContextHealth {
        let max_tokens = context_limit(self.model.as_deref());
        let tokens = self.total_tokens();
        let ratio = tokens as f64 / max_tokens as f64;

        let status = if ratio >= COMPACTION_THRESHOLD {
            HealthStatus::Critical
        } else if ratio >= WARNING_THRESHOLD {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let start = self.token_history.len().saturating_sub(SPARKLINE_SAMPLES);
        let token_history = self.token_history[start..]
            .iter()
            .map(|sample| sample.tokens)
            .collect();

        ContextHealth {
            tokens,
            percent: (ratio * 100.0).min(100.0).round() as u8,
            remaining: max_tokens.saturating_sub(tokens),
            max_tokens,
            burn_rate: self.burn_rate(),
            status,
            should_compact: ratio >= COMPACTION_THRESHOLD,
            breakdown: self.breakdown,
            token_history,
            session_start: self.session_start,
            last_update: self.last_update,
        }
    }

    /// Estimated cost of the latest authoritative usage record.
    pub fn cost(&self) -> CostEstimate {
        match self.transcript_usage {
            Some(usage) => CostEstimate::from_usage(
                &self.pricing,
                self.model.as_deref(),
                usage.input_tokens as i64,
                usage.output_tokens as i64,
                usage.cache_creation_input_tokens as i64,
                usage.cache_read_input_tokens as i64,
            ),
            None => CostEstimate::default(),
        }
    }

    /// Zero every counter and re-arm the transcript read state, as for a
    /// freshly constructed tracker. Used when a session restarts under the
    /// same process.
    pub fn reset(&mut self) {
        self.reset_transcript_state();
        self.model = None;
        self.compaction_count = 0;
        let now = self.clock.now();
        self.session_start = now;
        self.last_update = now;
    }

    fn reset_transcript_state(&mut self) {
        self.transcript_offset = 0;
        self.transcript_remainder.clear();
        self.transcript_usage = None;
        self.transcript_modified = None;
        self.real_tokens = 0;
        self.estimated_delta = 0;
        self.breakdown = ContextBreakdown::default();
        self.token_history.clear();
    }

    fn read_transcript(&mut self) {
        let Some(path) = self.transcript_path.clone() else {
            return;
        };
        if let Err(err) = self.try_read_transcript(&path) {
            // keep prior state; the next Stop retries
            debug!(path = %path.display(), error = %err, "transcript not available, using estimates");
        }
    }

    fn try_read_transcript(&mut self, path: &Path) -> std::io::Result<()> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata.modified().ok();
        if modified.is_some() && modified == self.transcript_modified {
            return Ok(());
        }

        let size = metadata.len();
        if size < self.transcript_offset {
            // rotated or truncated: start over as a fresh transcript
            debug!(path = %path.display(), "transcript shrank, treating as rotation");
            self.reset_transcript_state();
        }

        let chunk = read_range(path, self.transcript_offset, size)?;
        let mut buffer = std::mem::take(&mut self.transcript_remainder);
        buffer.extend_from_slice(&chunk);

        let mut lines: Vec<&[u8]> = buffer.split(|byte| *byte == b'\n').collect();
        // the final fragment may be a partial line; carry it to the next read
        let remainder = lines.pop().unwrap_or_default().to_vec();
        for line in lines {
            self.apply_transcript_line(line);
        }

        self.transcript_remainder = remainder;
        self.transcript_offset = size;
        self.transcript_modified = modified;

        if let Some(usage) = self.transcript_usage {
            let total = usage.total();
            if total > 0 {
                // transcript truth supersedes everything estimated since
                // the previous sync
                self.real_tokens = total;
                self.estimated_delta = 0;
                self.breakdown = ContextBreakdown {
                    tool_inputs: usage.input_tokens,
                    tool_outputs: usage.output_tokens,
                    messages: usage.cache_creation_input_tokens + usage.cache_read_input_tokens,
                    other: 0,
                };
            }
        }

        self.record_history();
        Ok(())
    }

    fn apply_transcript_line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }
        match serde_json::from_slice::<TranscriptRecord>(line) {
            Ok(record) => {
                if record.kind.as_deref() == Some("assistant")
                    && let Some(message) = record.message
                    && let Some(usage) = message.usage
                {
                    // latest usage record wins; no summation across entries
                    self.transcript_usage = Some(usage);
                    if let Some(model) = message.model {
                        self.model = Some(model);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to parse transcript line");
            }
        }
    }

    fn record_history(&mut self) {
        self.token_history.push(TokenSample {
            tokens: self.total_tokens(),
            at: self.clock.now(),
        });
        if self.token_history.len() > HISTORY_HIGH_WATER {
            let cut = self.token_history.len() - HISTORY_KEEP;
            self.token_history.drain(..cut);
        }
    }

    fn burn_rate(&self) -> i64 {
        if self.token_history.len() < 2 {
            return 0;
        }
        let start = self.token_history.len().saturating_sub(BURN_RATE_SAMPLES);
        let recent = &self.token_history[start..];
        if recent.len() < 2 {
            return 0;
        }

        let first = recent[0];
        let last = recent[recent.len() - 1];
        let minutes = (last.at - first.at).num_milliseconds() as f64 / 60_000.0;
        if minutes < BURN_RATE_MIN_MINUTES {
            return 0;
        }

        let diff = last.tokens as i64 - first.tokens as i64;
        (diff as f64 / minutes).round() as i64
    }
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Token estimate for a JSON payload: utf-8 length over [`CHARS_PER_TOKEN`],
/// rounded up.
fn estimate_tokens(value: &serde_json::Value) -> u64 {
    let serialized = value.to_string();
    (serialized.len() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Read the byte range `[start, end)` of a file.
fn read_range(path: &Path, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
    if end <= start {
        return Ok(Vec::new());
    }
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut buffer = Vec::with_capacity((end - start) as usize);
    file.take(end - start).read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use hud_core::ManualClock;
    use hud_events::HUD_EVENT_SCHEMA_VERSION;
    use serde_json::{json, Value};
    use std::io::Write;
    use std::sync::Arc;

    fn event(kind: HudEventKind, input: Option<Value>, response: Option<Value>) -> HudEvent {
        HudEvent {
            schema_version: HUD_EVENT_SCHEMA_VERSION,
            kind,
            tool: Some("Read".to_string()),
            tool_use_id: Some("tool-1".to_string()),
            input,
            response,
            session: "test-session".to_string(),
            ts: 0,
            permission_mode: None,
            cwd: None,
            transcript_path: None,
            prompt: None,
        }
    }

    fn post_tool_use(input: Value, response: Value) -> HudEvent {
        event(HudEventKind::PostToolUse, Some(input), Some(response))
    }

    fn manual_clock() -> Arc<ManualClock> {
        let start = DateTime::parse_from_rfc3339("2026-02-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ManualClock::starting_at(start)
    }

    fn usage_line(model: &str, input: u64, output: u64, creation: u64, read: u64) -> String {
        json!({
            "type": "assistant",
            "message": {
                "model": model,
                "usage": {
                    "input_tokens": input,
                    "output_tokens": output,
                    "cache_creation_input_tokens": creation,
                    "cache_read_input_tokens": read,
                },
            },
        })
        .to_string()
    }

    /// Filesystem mtime granularity can swallow back-to-back writes.
    fn settle_mtime() {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    #[test]
    fn test_initial_health_is_zero() {
        let tracker = ContextTracker::new();
        let health = tracker.health();

        assert_eq!(health.tokens, 0);
        assert_eq!(health.percent, 0);
        assert_eq!(health.remaining, 200_000);
        assert_eq!(health.max_tokens, 200_000);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(!health.should_compact);
        assert!(health.token_history.is_empty());
    }

    #[test]
    fn test_post_tool_use_estimates_tokens() {
        let mut tracker = ContextTracker::new();
        tracker.process_event(&post_tool_use(
            json!({"content": "a".repeat(400)}),
            json!({"result": "b".repeat(400)}),
        ));

        let health = tracker.health();
        assert!(health.tokens > 0);
        assert!(health.breakdown.tool_inputs > 0);
        assert!(health.breakdown.tool_outputs > 0);
        assert_eq!(
            health.tokens,
            health.breakdown.tool_inputs + health.breakdown.tool_outputs
        );
    }

    #[test]
    fn test_estimate_rounds_up() {
        // 5 bytes of JSON -> 2 tokens at 4 chars per token
        assert_eq!(estimate_tokens(&json!("abc")), 2);
        assert_eq!(estimate_tokens(&json!(null)), 1);
    }

    #[test]
    fn test_compaction_count_is_monotonic() {
        let mut tracker = ContextTracker::new();
        assert_eq!(tracker.compaction_count(), 0);

        tracker.process_event(&event(HudEventKind::PreCompact, None, None));
        assert_eq!(tracker.compaction_count(), 1);

        tracker.process_event(&event(HudEventKind::PreCompact, None, None));
        assert_eq!(tracker.compaction_count(), 2);

        // a transcript sync must not touch it
        tracker.process_event(&event(HudEventKind::Stop, None, None));
        assert_eq!(tracker.compaction_count(), 2);
    }

    #[test]
    fn test_sparkline_history_capped_at_20() {
        let mut tracker = ContextTracker::new();
        for _ in 0..30 {
            tracker.process_event(&post_tool_use(
                json!({"data": "x".repeat(100)}),
                json!({"data": "y".repeat(100)}),
            ));
        }

        let health = tracker.health();
        assert_eq!(health.token_history.len(), SPARKLINE_SAMPLES);
        // oldest first, monotonically growing under pure estimation
        assert!(health.token_history.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_history_batched_trim() {
        let mut tracker = ContextTracker::new();
        for _ in 0..101 {
            tracker.process_event(&post_tool_use(json!({"d": "x"}), json!({"d": "y"})));
        }
        // 101 samples exceeds the high-water mark and trims back to 50
        assert_eq!(tracker.token_history.len(), 50);
    }

    #[test]
    fn test_warning_at_70_percent() {
        let mut tracker = ContextTracker::new();
        // ~140k tokens of 200k = 70%
        tracker.process_event(&post_tool_use(
            json!({"data": "x".repeat(280_000)}),
            json!({"data": "x".repeat(280_000)}),
        ));

        let health = tracker.health();
        assert_eq!(health.status, HealthStatus::Warning);
        assert!(!health.should_compact);
    }

    #[test]
    fn test_critical_at_85_percent() {
        let mut tracker = ContextTracker::new();
        // ~170k tokens of 200k = 85%
        tracker.process_event(&post_tool_use(
            json!({"data": "x".repeat(340_000)}),
            json!({"data": "x".repeat(340_000)}),
        ));

        let health = tracker.health();
        assert_eq!(health.status, HealthStatus::Critical);
        assert!(health.should_compact);
    }

    #[test]
    fn test_percent_and_remaining_clamped() {
        let mut tracker = ContextTracker::new();
        // far past the window
        tracker.process_event(&post_tool_use(
            json!({"data": "x".repeat(900_000)}),
            json!({"data": "x".repeat(900_000)}),
        ));

        let health = tracker.health();
        assert_eq!(health.percent, 100);
        assert_eq!(health.remaining, 0);
    }

    #[test]
    fn test_burn_rate_zero_with_insufficient_history() {
        let mut tracker = ContextTracker::new();
        tracker.process_event(&post_tool_use(json!({"d": "x"}), json!({"d": "y"})));
        assert_eq!(tracker.health().burn_rate, 0);
    }

    #[test]
    fn test_burn_rate_zero_under_minimum_span() {
        let clock = manual_clock();
        let mut tracker = ContextTracker::with_clock(clock.clone());

        tracker.process_event(&post_tool_use(json!({"d": "x"}), json!({"d": "y"})));
        clock.advance(Duration::seconds(1));
        tracker.process_event(&post_tool_use(json!({"d": "x"}), json!({"d": "y"})));

        // 1 second span is under the 0.1 minute floor
        assert_eq!(tracker.health().burn_rate, 0);
    }

    #[test]
    fn test_burn_rate_per_minute() {
        let clock = manual_clock();
        let mut tracker = ContextTracker::with_clock(clock.clone());

        tracker.process_event(&post_tool_use(
            json!({"data": "x".repeat(100)}),
            json!({"data": "y".repeat(100)}),
        ));
        let first = tracker.health().tokens;

        clock.advance(Duration::minutes(2));
        tracker.process_event(&post_tool_use(
            json!({"data": "x".repeat(100)}),
            json!({"data": "y".repeat(100)}),
        ));
        let last = tracker.health().tokens;

        let expected = ((last - first) as f64 / 2.0).round() as i64;
        assert_eq!(tracker.health().burn_rate, expected);
    }

    #[test]
    fn test_transcript_usage_replaces_not_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        std::fs::write(
            &path,
            usage_line("claude-sonnet-4-5-20250929", 100, 200, 10, 5) + "\n",
        )
        .unwrap();

        let mut tracker = ContextTracker::new();
        tracker.set_transcript_path(&path);
        tracker.process_event(&event(HudEventKind::Stop, None, None));

        assert_eq!(tracker.health().tokens, 315);
        assert_eq!(tracker.model(), Some("claude-sonnet-4-5-20250929"));

        settle_mtime();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(
            file,
            "{}",
            usage_line("claude-sonnet-4-5-20250929", 300, 400, 10, 15)
        )
        .unwrap();

        tracker.process_event(&event(HudEventKind::Stop, None, None));

        // replacement, not accumulation: 725, never 1040
        assert_eq!(tracker.health().tokens, 725);
    }

    #[test]
    fn test_transcript_supersedes_estimates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");

        let mut tracker = ContextTracker::new();
        tracker.set_transcript_path(&path);

        tracker.process_event(&post_tool_use(
            json!({"data": "x".repeat(4000)}),
            json!({"data": "y".repeat(4000)}),
        ));
        assert!(tracker.health().tokens > 300);

        std::fs::write(&path, usage_line("claude-sonnet-4", 100, 200, 0, 0) + "\n").unwrap();
        tracker.process_event(&event(HudEventKind::Stop, None, None));

        // estimated delta discarded at the sync
        assert_eq!(tracker.health().tokens, 300);
        assert_eq!(tracker.health().breakdown.tool_inputs, 100);
        assert_eq!(tracker.health().breakdown.tool_outputs, 200);
    }

    #[test]
    fn test_transcript_rotation_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");

        let long_line = usage_line("claude-sonnet-4", 5000, 6000, 70, 80);
        std::fs::write(&path, format!("{long_line}\n{long_line}\n")).unwrap();

        let mut tracker = ContextTracker::new();
        tracker.set_transcript_path(&path);
        tracker.process_event(&event(HudEventKind::Stop, None, None));
        assert_eq!(tracker.health().tokens, 11_150);

        // rotate: replace with a much smaller file
        settle_mtime();
        std::fs::write(&path, usage_line("claude-sonnet-4", 10, 20, 0, 12) + "\n").unwrap();

        tracker.process_event(&event(HudEventKind::Stop, None, None));
        assert_eq!(tracker.health().tokens, 42);
    }

    #[test]
    fn test_transcript_partial_line_carried_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");

        let line = usage_line("claude-sonnet-4", 100, 200, 10, 5);
        let (head, tail) = line.split_at(line.len() / 2);

        std::fs::write(&path, head).unwrap();
        let mut tracker = ContextTracker::new();
        tracker.set_transcript_path(&path);
        tracker.process_event(&event(HudEventKind::Stop, None, None));
        // half a line is not a record
        assert_eq!(tracker.health().tokens, 0);

        settle_mtime();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{tail}\n").unwrap();

        tracker.process_event(&event(HudEventKind::Stop, None, None));
        assert_eq!(tracker.health().tokens, 315);
    }

    #[test]
    fn test_transcript_malformed_line_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        std::fs::write(
            &path,
            format!(
                "not json{{\n{}\n",
                usage_line("claude-sonnet-4", 50, 50, 0, 0)
            ),
        )
        .unwrap();

        let mut tracker = ContextTracker::new();
        tracker.set_transcript_path(&path);
        tracker.process_event(&event(HudEventKind::Stop, None, None));

        assert_eq!(tracker.health().tokens, 100);
    }

    #[test]
    fn test_transcript_non_assistant_records_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"user","message":{"content":"hello"}}"#,
                "\n",
                r#"{"type":"system","subtype":"init"}"#,
                "\n",
            ),
        )
        .unwrap();

        let mut tracker = ContextTracker::new();
        tracker.set_transcript_path(&path);
        tracker.process_event(&event(HudEventKind::Stop, None, None));

        assert_eq!(tracker.health().tokens, 0);
        assert_eq!(tracker.model(), None);
    }

    #[test]
    fn test_missing_transcript_keeps_estimates() {
        let mut tracker = ContextTracker::new();
        tracker.set_transcript_path("/nonexistent/transcript.jsonl");

        tracker.process_event(&post_tool_use(json!({"d": "x"}), json!({"d": "y"})));
        let before = tracker.health().tokens;
        assert!(before > 0);

        tracker.process_event(&event(HudEventKind::Stop, None, None));
        assert_eq!(tracker.health().tokens, before);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        std::fs::write(&path, usage_line("claude-opus-4", 100, 200, 10, 5) + "\n").unwrap();

        let mut tracker = ContextTracker::new();
        tracker.set_transcript_path(&path);
        tracker.process_event(&event(HudEventKind::Stop, None, None));
        tracker.process_event(&event(HudEventKind::PreCompact, None, None));
        assert!(tracker.health().tokens > 0);
        assert_eq!(tracker.compaction_count(), 1);

        tracker.reset();

        let health = tracker.health();
        assert_eq!(health.tokens, 0);
        assert_eq!(health.percent, 0);
        assert!(health.token_history.is_empty());
        assert_eq!(health.breakdown, ContextBreakdown::default());
        assert_eq!(tracker.compaction_count(), 0);
        assert_eq!(tracker.model(), None);
    }

    #[test]
    fn test_cost_from_transcript_usage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        std::fs::write(
            &path,
            usage_line("claude-sonnet-4-5-20250929", 1_000_000, 1_000_000, 0, 0) + "\n",
        )
        .unwrap();

        let mut tracker = ContextTracker::new();
        assert_eq!(tracker.cost(), CostEstimate::default());

        tracker.set_transcript_path(&path);
        tracker.process_event(&event(HudEventKind::Stop, None, None));

        let cost = tracker.cost();
        assert!((cost.total_usd - 18.0).abs() < 0.01);
        assert_eq!(cost.input_tokens, 1_000_000);
    }

    #[test]
    fn test_event_transcript_path_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        std::fs::write(&path, usage_line("claude-sonnet-4", 1, 2, 0, 0) + "\n").unwrap();

        let mut tracker = ContextTracker::new();
        let mut stop = event(HudEventKind::Stop, None, None);
        stop.transcript_path = Some(path.to_string_lossy().into_owned());
        tracker.process_event(&stop);

        assert_eq!(tracker.transcript_path(), Some(path.as_path()));
        assert_eq!(tracker.health().tokens, 3);
    }
}
