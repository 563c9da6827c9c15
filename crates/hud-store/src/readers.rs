//! TTL-cached file readers.
//!
//! Three small file-backed lookups feed the published state: the assistant's
//! settings file, the context-file layout of the working directory, and the
//! HUD's own display config. Each is an explicit object owned by the store
//! (no module-level cache state), with a 30-second TTL checked lazily at
//! read time, a `force_refresh` escape hatch, and an injected clock.
//!
//! A missing file is not an error (`None` data); an unreadable or corrupt
//! file yields `None` plus an advisory error string. Nothing here ever
//! propagates a failure to the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use hud_core::SharedClock;

/// Cache lifetime for all readers.
pub const READER_TTL_SECS: i64 = 30;

/// Result of a cached read: data if available, plus an advisory error.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

fn ttl_expired(last_read: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_read {
        None => true,
        Some(at) => now - at > Duration::seconds(READER_TTL_SECS),
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Digest of the assistant's settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettingsData {
    pub model: String,
    pub plugin_count: usize,
    pub plugin_names: Vec<String>,
    pub mcp_count: usize,
    pub mcp_names: Vec<String>,
    pub allowed_permissions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    model: Option<String>,
    #[serde(default, rename = "enabledPlugins")]
    enabled_plugins: HashMap<String, bool>,
    #[serde(default, rename = "mcpServers")]
    mcp_servers: HashMap<String, serde_json::Value>,
    #[serde(default)]
    permissions: RawPermissions,
}

#[derive(Debug, Default, Deserialize)]
struct RawPermissions {
    #[serde(default)]
    allow: Vec<String>,
}

fn build_settings_data(raw: RawSettings) -> SettingsData {
    let mut plugin_names: Vec<String> = raw
        .enabled_plugins
        .into_iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(name, _)| name.split('@').next().unwrap_or(&name).to_string())
        .collect();
    plugin_names.sort();

    let mut mcp_names: Vec<String> = raw.mcp_servers.into_keys().collect();
    mcp_names.sort();

    SettingsData {
        model: raw.model.unwrap_or_else(|| "unknown".to_string()),
        plugin_count: plugin_names.len(),
        plugin_names,
        mcp_count: mcp_names.len(),
        mcp_names,
        allowed_permissions: raw.permissions.allow,
    }
}

/// Read and digest the settings file once, uncached.
pub fn read_settings(path: &Path) -> ReadOutcome<SettingsData> {
    if !path.exists() {
        return ReadOutcome::default();
    }
    match std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str::<RawSettings>(&content).map_err(|e| e.to_string()))
    {
        Ok(raw) => ReadOutcome {
            data: Some(build_settings_data(raw)),
            error: None,
        },
        Err(err) => {
            debug!(path = %path.display(), error = %err, "failed to read settings");
            ReadOutcome {
                data: None,
                error: Some("failed to read settings.json".to_string()),
            }
        }
    }
}

/// TTL-cached settings reader.
pub struct SettingsReader {
    path: PathBuf,
    clock: SharedClock,
    data: Option<SettingsData>,
    error: Option<String>,
    last_read: Option<DateTime<Utc>>,
}

impl SettingsReader {
    pub fn new(path: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            path: path.into(),
            clock,
            data: None,
            error: None,
            last_read: None,
        }
    }

    /// Default location, `~/.claude/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".claude").join("settings.json"))
    }

    /// Cached read; hits the filesystem only when the cache is empty or
    /// past its TTL.
    pub fn read(&mut self) -> ReadOutcome<SettingsData> {
        let now = self.clock.now();
        if self.data.is_none() || ttl_expired(self.last_read, now) {
            self.refresh(now);
        }
        ReadOutcome {
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }

    /// Bypass the TTL and re-read now.
    pub fn force_refresh(&mut self) -> Option<SettingsData> {
        let now = self.clock.now();
        self.refresh(now);
        self.data.clone()
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        let outcome = read_settings(&self.path);
        self.data = outcome.data;
        self.error = outcome.error;
        self.last_read = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Context files
// ---------------------------------------------------------------------------

/// Presence of instruction files for the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextFiles {
    pub global_claude_md: bool,
    pub project_claude_md: bool,
    pub project_claude_md_path: Option<PathBuf>,
    pub rules_count: usize,
}

fn count_rules(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|entry| {
            entry.file_type().map(|t| t.is_file()).unwrap_or(false)
                && !entry.file_name().to_string_lossy().starts_with('.')
        })
        .count()
}

/// Detect instruction files once, uncached.
pub fn detect_context_files(home: &Path, cwd: Option<&Path>) -> ContextFiles {
    let mut result = ContextFiles {
        global_claude_md: home.join(".claude").join("CLAUDE.md").exists(),
        ..ContextFiles::default()
    };

    let global_rules = home.join(".claude").join("rules");

    let Some(cwd) = cwd else {
        result.rules_count = count_rules(&global_rules);
        return result;
    };

    for candidate in [cwd.join(".claude").join("CLAUDE.md"), cwd.join("CLAUDE.md")] {
        if candidate.exists() {
            result.project_claude_md = true;
            result.project_claude_md_path = Some(candidate);
            break;
        }
    }

    result.rules_count = count_rules(&global_rules) + count_rules(&cwd.join(".claude").join("rules"));
    result
}

/// TTL-cached context-file detector; a changed cwd busts the cache.
pub struct ContextFilesDetector {
    home: PathBuf,
    clock: SharedClock,
    data: Option<ContextFiles>,
    last_cwd: Option<PathBuf>,
    last_read: Option<DateTime<Utc>>,
}

impl ContextFilesDetector {
    pub fn new(home: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            home: home.into(),
            clock,
            data: None,
            last_cwd: None,
            last_read: None,
        }
    }

    pub fn detect(&mut self, cwd: Option<&Path>) -> ContextFiles {
        let now = self.clock.now();
        let cwd_changed = self.last_cwd.as_deref() != cwd;
        if self.data.is_none() || cwd_changed || ttl_expired(self.last_read, now) {
            self.data = Some(detect_context_files(&self.home, cwd));
            self.last_cwd = cwd.map(Path::to_path_buf);
            self.last_read = Some(now);
        }
        self.data.clone().unwrap_or_default()
    }

    pub fn force_refresh(&mut self, cwd: Option<&Path>) -> ContextFiles {
        self.data = Some(detect_context_files(&self.home, cwd));
        self.last_cwd = cwd.map(Path::to_path_buf);
        self.last_read = Some(self.clock.now());
        self.data.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// HUD display config
// ---------------------------------------------------------------------------

/// Panels the display layer knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PanelId {
    Status,
    Context,
    Cost,
    ContextInfo,
    Tools,
    Agents,
    Todos,
}

/// User display preferences. Unknown panel ids are dropped, duplicates
/// removed; a non-positive width is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HudConfig {
    pub panel_order: Option<Vec<PanelId>>,
    pub hidden_panels: Option<Vec<PanelId>>,
    pub width: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHudConfig {
    #[serde(default, rename = "panelOrder")]
    panel_order: Option<Vec<serde_json::Value>>,
    #[serde(default, rename = "hiddenPanels")]
    hidden_panels: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    width: Option<i64>,
}

fn normalize_panel_list(values: Option<Vec<serde_json::Value>>) -> Option<Vec<PanelId>> {
    let values = values?;
    let mut panels = Vec::new();
    for value in values {
        if let Ok(panel) = serde_json::from_value::<PanelId>(value)
            && !panels.contains(&panel)
        {
            panels.push(panel);
        }
    }
    Some(panels)
}

fn build_hud_config(raw: RawHudConfig) -> HudConfig {
    HudConfig {
        panel_order: normalize_panel_list(raw.panel_order),
        hidden_panels: normalize_panel_list(raw.hidden_panels),
        width: raw
            .width
            .filter(|w| *w > 0)
            .and_then(|w| u16::try_from(w).ok()),
    }
}

/// Read and normalize the HUD config once, uncached.
pub fn read_hud_config(path: &Path) -> ReadOutcome<HudConfig> {
    if !path.exists() {
        return ReadOutcome::default();
    }
    match std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| {
            serde_json::from_str::<RawHudConfig>(&content).map_err(|e| e.to_string())
        }) {
        Ok(raw) => ReadOutcome {
            data: Some(build_hud_config(raw)),
            error: None,
        },
        Err(err) => {
            debug!(path = %path.display(), error = %err, "failed to read hud config");
            ReadOutcome {
                data: None,
                error: Some("failed to read hud config".to_string()),
            }
        }
    }
}

/// TTL-cached HUD config reader.
pub struct HudConfigReader {
    path: PathBuf,
    clock: SharedClock,
    data: Option<HudConfig>,
    error: Option<String>,
    last_read: Option<DateTime<Utc>>,
}

impl HudConfigReader {
    pub fn new(path: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            path: path.into(),
            clock,
            data: None,
            error: None,
            last_read: None,
        }
    }

    /// Default location, `~/.claude/hud/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".claude").join("hud").join("config.json"))
    }

    pub fn read(&mut self) -> ReadOutcome<HudConfig> {
        let now = self.clock.now();
        if self.data.is_none() || ttl_expired(self.last_read, now) {
            self.refresh(now);
        }
        ReadOutcome {
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }

    pub fn force_refresh(&mut self) -> Option<HudConfig> {
        let now = self.clock.now();
        self.refresh(now);
        self.data.clone()
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        let outcome = read_hud_config(&self.path);
        self.data = outcome.data;
        self.error = outcome.error;
        self.last_read = Some(now);
    }
}
