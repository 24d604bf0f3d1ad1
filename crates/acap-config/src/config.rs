//! Agent CLI configuration (`~/.config/acap/config.toml` + `AGENT_CLI_*` env).
//!
//! The loaded [`AgentCliConfig`] is an immutable snapshot: callers load it
//! once and pass it by reference into every task executor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use acap_core::{ProviderId, StreamRenderMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Read-only configuration snapshot consumed by the provider adapter layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCliConfig {
    /// Provider used when the caller does not pick one.
    #[serde(default)]
    pub default_provider: ProviderId,
    /// Per-provider binary/model overrides keyed by provider wire name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub run_log: RunLogConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Per-provider configuration. Unset fields fall back to built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Executable name or path.
    #[serde(default)]
    pub binary: Option<String>,
    /// Default model passed via the provider's model flag.
    #[serde(default)]
    pub model: Option<String>,
}

/// Boolean policy toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub warn_on_degraded_caps: bool,
    pub require_json_output: bool,
    pub non_interactive: bool,
    pub auto_approve_fallback: bool,
    pub dangerous_fallback: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            warn_on_degraded_caps: true,
            require_json_output: true,
            non_interactive: true,
            auto_approve_fallback: true,
            dangerous_fallback: true,
        }
    }
}

impl PolicyConfig {
    /// The approval-bypass retry fires only when both toggles are enabled.
    pub fn bypass_fallback_enabled(&self) -> bool {
        self.auto_approve_fallback && self.dangerous_fallback
    }
}

/// JSONL run log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLogConfig {
    pub enabled: bool,
    /// Directory for `*.jsonl` run logs. None = XDG state dir.
    pub dir: Option<PathBuf>,
}

impl Default for RunLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// Human-facing stream rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub mode: StreamRenderMode,
    pub show_thinking: bool,
}

impl AgentCliConfig {
    /// Load from the default path, then apply environment overrides.
    ///
    /// A missing file (or an undeterminable config dir, e.g. no HOME in
    /// containers) yields defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a TOML file without applying environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agent config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse agent config: {}", path.display()))?;
        debug!(path = %path.display(), "loaded agent config");
        Ok(config)
    }

    /// Path to the config file: `~/.config/acap/config.toml`.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "acap")
            .context("Failed to determine config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply `AGENT_CLI_*` / `AGENT_RUN_LOG_*` / `AGENT_STREAM_*` variables
    /// from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable booleans and render modes leave the current value intact.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("AGENT_CLI_ID") {
            self.default_provider = ProviderId::normalize(&id);
        }

        for provider in ProviderId::ALL {
            let suffix = provider.as_str().to_ascii_uppercase();
            let binary = lookup(&format!("AGENT_CLI_BIN_{suffix}"));
            let model = lookup(&format!("AGENT_CLI_MODEL_{suffix}"));
            if binary.is_none() && model.is_none() {
                continue;
            }
            let entry = self
                .providers
                .entry(provider.as_str().to_string())
                .or_default();
            if let Some(binary) = binary.filter(|b| !b.trim().is_empty()) {
                entry.binary = Some(binary);
            }
            if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
                entry.model = Some(model);
            }
        }

        let policy = &mut self.policy;
        override_bool(
            &lookup,
            "AGENT_CLI_WARN_ON_DEGRADED_CAPS",
            &mut policy.warn_on_degraded_caps,
        );
        override_bool(
            &lookup,
            "AGENT_CLI_REQUIRE_JSON_OUTPUT",
            &mut policy.require_json_output,
        );
        override_bool(&lookup, "AGENT_CLI_NON_INTERACTIVE", &mut policy.non_interactive);
        override_bool(
            &lookup,
            "AGENT_CLI_AUTO_APPROVE_FALLBACK",
            &mut policy.auto_approve_fallback,
        );
        override_bool(
            &lookup,
            "AGENT_CLI_DANGEROUS_FALLBACK",
            &mut policy.dangerous_fallback,
        );

        override_bool(&lookup, "AGENT_RUN_LOG_ENABLED", &mut self.run_log.enabled);
        if let Some(dir) = lookup("AGENT_RUN_LOG_DIR").filter(|d| !d.trim().is_empty()) {
            self.run_log.dir = Some(PathBuf::from(dir));
        }

        if let Some(mode) = lookup("AGENT_STREAM_STDOUT_MODE")
            .as_deref()
            .and_then(StreamRenderMode::parse_lenient)
        {
            self.stream.mode = mode;
        }
        override_bool(
            &lookup,
            "AGENT_STREAM_SHOW_THINKING",
            &mut self.stream.show_thinking,
        );
    }

    /// Executable name/path for a provider.
    pub fn binary(&self, provider: ProviderId) -> &str {
        self.providers
            .get(provider.as_str())
            .and_then(|p| p.binary.as_deref())
            .unwrap_or(provider.as_str())
    }

    /// Default model for a provider.
    pub fn default_model(&self, provider: ProviderId) -> &str {
        self.providers
            .get(provider.as_str())
            .and_then(|p| p.model.as_deref())
            .unwrap_or_else(|| builtin_default_model(provider))
    }

    /// Model for this run: non-empty explicit override wins over the default.
    pub fn resolve_model(&self, provider: ProviderId, cli_override: Option<&str>) -> String {
        cli_override
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model(provider))
            .to_string()
    }

    /// Directory for JSONL run logs.
    ///
    /// Prefers `~/.local/state/acap/runs/` but falls back to the temp dir on
    /// platforms where `state_dir()` is unavailable (e.g., macOS).
    pub fn run_log_dir(&self) -> PathBuf {
        if let Some(dir) = &self.run_log.dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "acap")
            .and_then(|dirs| dirs.state_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| std::env::temp_dir().join("acap-state"))
            .join("runs")
    }

    /// Generate default config TOML with comments as a template.
    pub fn default_template() -> String {
        r#"# acap agent CLI configuration
# Location: ~/.config/acap/config.toml
#
# Every key may also be overridden through AGENT_CLI_* environment variables.

default_provider = "claude"  # claude | codex | omp | opencode

[policy]
warn_on_degraded_caps = true
require_json_output = true
non_interactive = true
# The approval-bypass retry for autonomous sessions runs only when both
# toggles below are true.
auto_approve_fallback = true
dangerous_fallback = true

[run_log]
enabled = true
# dir = "/path/to/run-logs"

[stream]
mode = "assistant_text"  # assistant_text | compact | raw
show_thinking = false

# Per-provider overrides. Uncomment and configure as needed.
#
# [providers.claude]
# binary = "claude"
# model = "claude-sonnet-4-6"
#
# [providers.codex]
# binary = "codex"
# model = "gpt-5-codex"
#
# [providers.omp]
# binary = "omp"
# model = "claude-sonnet-4-5"
#
# [providers.opencode]
# binary = "opencode"
# model = "claude-sonnet-4-5"
"#
        .to_string()
    }
}

/// Built-in default model per provider.
pub fn builtin_default_model(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Claude => "claude-sonnet-4-6",
        ProviderId::Codex => "gpt-5-codex",
        ProviderId::Omp => "claude-sonnet-4-5",
        ProviderId::Opencode => "claude-sonnet-4-5",
    }
}

/// Parse boolean-like values; None for anything unrecognized.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn override_bool<F>(lookup: &F, key: &str, target: &mut bool)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(parsed) = lookup(key).as_deref().and_then(parse_bool) {
        *target = parsed;
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
