//! Static per-provider capability table.
//!
//! Decides, per task, whether a provider receives native flags or a shimmed
//! prompt. Constructed as constants; never mutated.

use serde::Serialize;

use crate::types::ProviderId;

/// Capability flags used to choose native flags vs shim behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderCapabilities {
    pub native_system_prompt: bool,
    pub native_append_system_prompt: bool,
    pub native_tool_allowlist: bool,
    pub native_sandbox_policy: bool,
    pub native_approval_policy: bool,
    /// Structured (JSON event) streaming output mode.
    pub json_stream: bool,
    pub session_resume: bool,
}

const CLAUDE: ProviderCapabilities = ProviderCapabilities {
    native_system_prompt: true,
    native_append_system_prompt: true,
    native_tool_allowlist: true,
    native_sandbox_policy: true,
    native_approval_policy: true,
    json_stream: false,
    session_resume: false,
};

const CODEX: ProviderCapabilities = ProviderCapabilities {
    native_system_prompt: false,
    native_append_system_prompt: false,
    native_tool_allowlist: false,
    native_sandbox_policy: true,
    native_approval_policy: true,
    json_stream: true,
    session_resume: true,
};

const OMP: ProviderCapabilities = ProviderCapabilities {
    native_system_prompt: true,
    native_append_system_prompt: true,
    native_tool_allowlist: true,
    native_sandbox_policy: false,
    native_approval_policy: false,
    json_stream: true,
    session_resume: false,
};

const OPENCODE: ProviderCapabilities = ProviderCapabilities {
    native_system_prompt: false,
    native_append_system_prompt: false,
    native_tool_allowlist: false,
    native_sandbox_policy: false,
    native_approval_policy: false,
    json_stream: true,
    session_resume: true,
};

/// Capability lookup. Total: unknown ids are normalized before they get here.
pub fn capabilities(provider: ProviderId) -> ProviderCapabilities {
    match provider {
        ProviderId::Claude => CLAUDE,
        ProviderId::Codex => CODEX,
        ProviderId::Omp => OMP,
        ProviderId::Opencode => OPENCODE,
    }
}

impl ProviderId {
    pub fn capabilities(&self) -> ProviderCapabilities {
        capabilities(*self)
    }
}

impl ProviderCapabilities {
    /// Human-readable gaps relative to the reference provider.
    pub fn degraded_gaps(&self) -> Vec<&'static str> {
        let mut gaps = Vec::new();
        if !self.native_system_prompt {
            gaps.push("system prompt is shimmed into user prompt");
        }
        if !self.native_tool_allowlist {
            gaps.push("tool policy is prompt-based (best effort)");
        }
        if !self.native_sandbox_policy {
            gaps.push("no native sandbox policy flag");
        }
        if !self.native_approval_policy {
            gaps.push("no native approval policy flag");
        }
        gaps
    }
}
