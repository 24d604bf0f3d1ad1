//! Command builder: provider-specific argument vectors and shim decisions.
//!
//! Every template is static per provider. The same spec and configuration
//! always produce an identical [`CommandPlan`].

use std::path::{Path, PathBuf};

use acap_config::AgentCliConfig;
use acap_core::{AppError, ProviderCapabilities, ProviderId, PromptTransport};
use anyhow::Result;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::shim::shim_prompt;
use crate::task::TaskSpec;

/// Fully resolved invocation for one provider run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Bytes written to the child's stdin (stdin transport only).
    pub stdin: Option<String>,
    /// The composed prompt when shimming was applied.
    pub shimmed_prompt: Option<String>,
    pub transport: PromptTransport,
}

impl CommandPlan {
    /// Build a tokio command running in `cwd`.
    pub fn to_command(&self, cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.current_dir(cwd);
        cmd
    }

    pub fn stdin_bytes(&self) -> Option<Vec<u8>> {
        self.stdin.as_ref().map(|s| s.clone().into_bytes())
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Program plus flags, with the task payload elided.
    pub fn display_redacted(&self) -> String {
        let payload = self.shimmed_prompt.as_deref();
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            if payload == Some(arg.as_str()) || arg.contains('\n') {
                parts.push("<prompt>".to_string());
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Extra flags that skip approvals and the sandbox for a retry attempt.
pub fn bypass_args(provider: ProviderId) -> &'static [&'static str] {
    match provider {
        ProviderId::Codex => &["--dangerously-bypass-approvals-and-sandbox"],
        ProviderId::Claude | ProviderId::Omp | ProviderId::Opencode => &[],
    }
}

/// Whether a provider has to receive a shimmed prompt.
fn needs_shim(caps: &ProviderCapabilities, require_json: bool) -> bool {
    !caps.native_system_prompt
        || !caps.native_tool_allowlist
        || (require_json && !caps.json_stream)
}

fn plan(
    program: &str,
    provider: ProviderId,
    args: Vec<String>,
    stdin: Option<String>,
    shimmed_prompt: Option<String>,
) -> CommandPlan {
    CommandPlan {
        program: program.to_string(),
        args,
        stdin,
        shimmed_prompt,
        transport: provider.prompt_transport(),
    }
}

/// Plan a one-shot prompt task (analysis, stack detection, generation).
///
/// Claude receives native flags and the body on stdin. Other providers get
/// the body on argv, shimmed when they lack a native system prompt or tool
/// allowlist, or when JSON is required without a structured stream mode.
pub fn build_prompt_plan(spec: &TaskSpec, config: &AgentCliConfig) -> CommandPlan {
    let provider = spec.provider;
    let caps = provider.capabilities();
    let model = spec.model.clone();
    let allowed_tools = spec.allowed_tools_or_default();
    let require_json = spec.require_json && config.policy.require_json_output;

    let shimmed = (provider != ProviderId::Claude && needs_shim(&caps, require_json)).then(|| {
        shim_prompt(
            &spec.prompt,
            &spec.system_prompt,
            (!caps.native_tool_allowlist).then_some(allowed_tools),
            require_json,
        )
    });
    debug!(
        %provider,
        shimmed = shimmed.is_some(),
        require_json,
        "planned prompt task"
    );
    let task = || shimmed.clone().unwrap_or_else(|| spec.prompt.clone());

    let mut args: Vec<String> = Vec::new();
    let mut stdin = None;
    match provider {
        ProviderId::Claude => {
            args.extend([
                "-p".into(),
                "--model".into(),
                model,
                "--allowedTools".into(),
                allowed_tools.to_string(),
                "--system-prompt".into(),
                spec.system_prompt.clone(),
            ]);
            stdin = Some(spec.prompt.clone());
        }
        ProviderId::Codex => {
            args.push("exec".into());
            if config.policy.non_interactive {
                args.push("--full-auto".into());
            }
            args.extend(["--model".into(), model, task()]);
        }
        ProviderId::Omp => {
            args.extend([
                "-p".into(),
                task(),
                "--model".into(),
                model,
                "--mode".into(),
                "json".into(),
            ]);
            if caps.native_system_prompt && shimmed.is_none() {
                args.extend(["--system-prompt".into(), spec.system_prompt.clone()]);
            }
        }
        ProviderId::Opencode => {
            args.extend([
                "run".into(),
                task(),
                "--model".into(),
                model,
                "--format".into(),
                "json".into(),
            ]);
        }
    }

    plan(config.binary(provider), provider, args, stdin, shimmed)
}

/// Plan an autonomous coding session.
///
/// `bypass_approvals` adds the provider's [`bypass_args`]; it is only set for
/// the single approval-fallback retry.
pub fn build_session_plan(
    spec: &TaskSpec,
    config: &AgentCliConfig,
    bypass_approvals: bool,
) -> Result<CommandPlan> {
    let provider = spec.provider;
    let caps = provider.capabilities();
    let model = spec.model.clone();

    let shimmed = (provider != ProviderId::Claude && needs_shim(&caps, false))
        .then(|| shim_prompt(&spec.prompt, &spec.system_prompt, None, false));
    debug!(
        %provider,
        shimmed = shimmed.is_some(),
        bypass_approvals,
        "planned session task"
    );
    let task = || shimmed.clone().unwrap_or_else(|| spec.prompt.clone());

    let mut args: Vec<String> = Vec::new();
    let mut stdin = None;
    match provider {
        ProviderId::Claude => {
            let settings = spec
                .settings_file
                .as_deref()
                .ok_or(AppError::MissingSettingsFile { provider })?;
            let settings = absolute_settings_path(settings, &spec.working_dir);
            args.extend([
                "--dangerously-skip-permissions".into(),
                "--model".into(),
                model,
                "--settings".into(),
                settings.to_string_lossy().into_owned(),
                "--append-system-prompt".into(),
                spec.system_prompt.clone(),
            ]);
            stdin = Some(spec.prompt.clone());
        }
        ProviderId::Codex => {
            args.push("exec".into());
            if bypass_approvals {
                args.extend(bypass_args(provider).iter().map(|a| a.to_string()));
            } else if config.policy.non_interactive {
                args.push("--full-auto".into());
            }
            args.extend(["--model".into(), model, task()]);
        }
        ProviderId::Omp => {
            args.extend(["-p".into(), task(), "--model".into(), model]);
            if config.policy.non_interactive {
                args.push("--no-pty".into());
            }
            if caps.native_append_system_prompt && shimmed.is_none() {
                args.extend(["--append-system-prompt".into(), spec.system_prompt.clone()]);
            }
        }
        ProviderId::Opencode => {
            args.extend(["run".into(), task(), "--model".into(), model]);
        }
    }

    Ok(plan(config.binary(provider), provider, args, stdin, shimmed))
}

/// Relative settings paths resolve against the task working directory.
fn absolute_settings_path(settings: &Path, working_dir: &Path) -> PathBuf {
    let joined = if settings.is_absolute() {
        settings.to_path_buf()
    } else {
        working_dir.join(settings)
    };
    std::path::absolute(&joined).unwrap_or(joined)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
