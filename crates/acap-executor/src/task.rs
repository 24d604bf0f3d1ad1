use std::path::{Path, PathBuf};

use acap_core::ProviderId;
use serde::Serialize;

/// Allowed tool categories when a task does not name any.
pub const DEFAULT_ALLOWED_TOOLS: &str = "Edit,Bash,Task";

/// One provider invocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    pub provider: ProviderId,
    pub model: String,
    pub system_prompt: String,
    /// Task body; delivered on stdin or argv depending on the provider.
    pub prompt: String,
    pub working_dir: PathBuf,
    /// Comma-delimited tool categories.
    pub allowed_tools: Option<String>,
    /// Sandbox/permission policy file (mandatory for claude sessions).
    pub settings_file: Option<PathBuf>,
    pub require_json: bool,
}

impl TaskSpec {
    pub fn new(
        provider: ProviderId,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        prompt: impl Into<String>,
        working_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            working_dir: working_dir.as_ref().to_path_buf(),
            allowed_tools: None,
            settings_file: None,
            require_json: false,
        }
    }

    pub fn with_allowed_tools(mut self, tools: impl Into<String>) -> Self {
        self.allowed_tools = Some(tools.into());
        self
    }

    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    pub fn with_require_json(mut self, require_json: bool) -> Self {
        self.require_json = require_json;
        self
    }

    /// Allowed tools, falling back to [`DEFAULT_ALLOWED_TOOLS`].
    pub fn allowed_tools_or_default(&self) -> &str {
        self.allowed_tools
            .as_deref()
            .map(str::trim)
            .filter(|tools| !tools.is_empty())
            .unwrap_or(DEFAULT_ALLOWED_TOOLS)
    }
}
