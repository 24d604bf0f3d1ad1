//! Task executors: the externally visible operations built on the command
//! builder, the process runner, and the structured output extractor.

use std::collections::BTreeMap;

use acap_config::AgentCliConfig;
use acap_core::{AppError, PromptKind, ProviderId, TaskKind};
use acap_output::{
    ExtractError, ExtractOptions, RunLogger, SESSION_FINISHED, SESSION_STARTED, StreamCleaner,
    extract_json_object,
};
use acap_process::{ExecutionResult, StreamEvent, StreamName, StreamSink};
use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::approval::detect_approval_required;
use crate::command::{CommandPlan, build_prompt_plan, build_session_plan, bypass_args};
use crate::runner::{CommandRunner, LocalRunner};
use crate::task::TaskSpec;

const STDERR_MAX_CHARS: usize = 500;
const NO_STDERR: &str = "(no stderr)";

/// Runs tasks against one configuration snapshot.
pub struct TaskExecutor<'a, R = LocalRunner> {
    config: &'a AgentCliConfig,
    runner: R,
}

impl<'a> TaskExecutor<'a> {
    pub fn new(config: &'a AgentCliConfig) -> Self {
        Self::with_runner(config, LocalRunner)
    }
}

impl<'a, R: CommandRunner> TaskExecutor<'a, R> {
    pub fn with_runner(config: &'a AgentCliConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &'a AgentCliConfig {
        self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// One-shot prompt task. A non-zero exit is returned as a normal result.
    pub async fn run_prompt_task(
        &self,
        kind: PromptKind,
        spec: &TaskSpec,
        sink: Option<StreamSink<'_>>,
    ) -> Result<ExecutionResult> {
        self.warn_degraded(spec.provider);
        let plan = build_prompt_plan(spec, self.config);
        self.launch(&plan, spec, kind.as_str(), sink).await
    }

    /// One-shot prompt task whose stdout must hold one JSON object.
    ///
    /// JSON output is always requested. A non-zero exit becomes
    /// [`AppError::TaskFailed`]; unusable output surfaces as [`ExtractError`].
    pub async fn run_structured_task(
        &self,
        kind: PromptKind,
        spec: &TaskSpec,
        options: &ExtractOptions,
        sink: Option<StreamSink<'_>>,
    ) -> Result<Map<String, Value>> {
        let spec = spec.clone().with_require_json(true);
        let result = self.run_prompt_task(kind, &spec, sink).await?;
        if !result.success() {
            return Err(AppError::TaskFailed {
                provider: spec.provider,
                exit_code: result.exit_code,
                stderr: truncated_stderr(&result.stderr),
            }
            .into());
        }
        let object = extract_json_object(&result.stdout, options)?;
        debug!(keys = object.len(), kind = kind.as_str(), "extracted structured output");
        Ok(object)
    }

    /// Generation task with one repair attempt.
    ///
    /// Only an [`ExtractError`] on the first attempt triggers the repair run;
    /// its prompt embeds the diagnostic. If the repair also fails, both errors
    /// are reported as [`AppError::GenerationFailed`].
    pub async fn run_generation_task(
        &self,
        spec: &TaskSpec,
        options: &ExtractOptions,
        mut sink: Option<StreamSink<'_>>,
    ) -> Result<Map<String, Value>> {
        let kind = PromptKind::Generation;
        let first = match self
            .run_structured_task(kind, spec, options, reborrow(&mut sink))
            .await
        {
            Ok(object) => return Ok(object),
            Err(err) => err.downcast::<ExtractError>()?,
        };

        warn!(
            provider = %spec.provider,
            reasons = first.reasons.len(),
            "generation output unusable; retrying once with a repair prompt"
        );
        let mut repair = spec.clone();
        repair.prompt = repair_prompt(&spec.prompt, &first, options);

        self.run_structured_task(kind, &repair, options, sink)
            .await
            .map_err(|err| {
                AppError::GenerationFailed {
                    original: first.to_string(),
                    repair: err.to_string(),
                }
                .into()
            })
    }

    /// Autonomous session task.
    ///
    /// When the first attempt fails with an approval-required marker, the
    /// provider has bypass flags, and the bypass fallback is enabled, exactly
    /// one more attempt runs with approvals bypassed. The caller only sees the
    /// result of the last attempt.
    pub async fn run_agent_task(
        &self,
        spec: &TaskSpec,
        mut sink: Option<StreamSink<'_>>,
    ) -> Result<ExecutionResult> {
        self.warn_degraded(spec.provider);
        let phase = TaskKind::Session.phase();

        let plan = build_session_plan(spec, self.config, false)?;
        let first = self.launch(&plan, spec, phase, reborrow(&mut sink)).await?;

        if !self.config.policy.bypass_fallback_enabled() || bypass_args(spec.provider).is_empty() {
            return Ok(first);
        }
        let Some(approval) = detect_approval_required(spec.provider, &first) else {
            return Ok(first);
        };

        warn!(
            provider = %spec.provider,
            exit_code = first.exit_code,
            matched_pattern = %approval.matched_pattern,
            "approval required; retrying once with approvals bypassed"
        );
        let plan = build_session_plan(spec, self.config, true)?;
        self.launch(&plan, spec, phase, sink).await
    }

    /// [`run_agent_task`](Self::run_agent_task) with every stream line written
    /// to `logger` and rendered through `cleaner` into `render`, tagged with
    /// the stream it came from.
    ///
    /// Lifecycle records bracket the run; the finish record carries the
    /// return code, or the error when the run could not complete.
    pub async fn run_logged_agent_task(
        &self,
        spec: &TaskSpec,
        logger: &mut RunLogger,
        cleaner: &StreamCleaner,
        render: &mut (dyn FnMut(StreamName, &str) + Send),
    ) -> Result<ExecutionResult> {
        let phase = TaskKind::Session.phase();
        let provider = spec.provider;
        logger.log_lifecycle(phase, SESSION_STARTED, None);

        let outcome = {
            let mut sink = |event: &StreamEvent| {
                logger.log_stream(phase, event.stream, &event.line);
                for line in cleaner.ingest(provider, event.stream, &event.line) {
                    render(event.stream, &line);
                }
            };
            self.run_agent_task(spec, Some(&mut sink)).await
        };

        let meta = match &outcome {
            Ok(result) => BTreeMap::from([("return_code".to_string(), result.exit_code.to_string())]),
            Err(err) => BTreeMap::from([("error".to_string(), err.to_string())]),
        };
        logger.log_lifecycle(phase, SESSION_FINISHED, Some(&meta));
        outcome
    }

    async fn launch(
        &self,
        plan: &CommandPlan,
        spec: &TaskSpec,
        phase: &str,
        sink: Option<StreamSink<'_>>,
    ) -> Result<ExecutionResult> {
        let resolved = self.runner.resolve_binary(spec.provider, &plan.program)?;
        info!(
            provider = %spec.provider,
            phase,
            binary = %resolved.display(),
            command = %plan.display_redacted(),
            "launching provider"
        );
        let result = self.runner.run(plan, &spec.working_dir, sink).await?;
        debug!(
            provider = %spec.provider,
            exit_code = result.exit_code,
            summary = %result.summary,
            "provider exited"
        );
        Ok(result)
    }

    fn warn_degraded(&self, provider: ProviderId) {
        if let Some(message) = degraded_capability_warning(provider, self.config) {
            warn!("{message}");
        }
    }
}

/// Capability parity warning for best-effort providers. Never for claude.
pub fn degraded_capability_warning(
    provider: ProviderId,
    config: &AgentCliConfig,
) -> Option<String> {
    if !config.policy.warn_on_degraded_caps || provider == ProviderId::Claude {
        return None;
    }
    let gaps = provider.capabilities().degraded_gaps();
    if gaps.is_empty() {
        return None;
    }
    Some(format!(
        "Reduced capability parity for provider '{provider}': {}.",
        gaps.join(", ")
    ))
}

/// Follow-up prompt for a generation whose output could not be extracted.
pub fn repair_prompt(original_prompt: &str, error: &ExtractError, options: &ExtractOptions) -> String {
    let keys: Vec<&str> = options.required_keys.iter().map(String::as_str).collect();
    let contract = if keys.is_empty() {
        "Respond again with ONLY one valid JSON object.".to_string()
    } else {
        format!(
            "Respond again with ONLY one valid JSON object containing {}these keys: {}.",
            if options.exact_keys { "exactly " } else { "" },
            keys.join(", ")
        )
    };
    format!(
        "{original_prompt}\n\n\
         Your previous response could not be used.\n\
         {error}\n\n\
         {contract} No markdown fences, no commentary."
    )
}

fn truncated_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        return NO_STDERR.to_string();
    }
    stderr.chars().take(STDERR_MAX_CHARS).collect()
}

fn reborrow<'s>(sink: &'s mut Option<StreamSink<'_>>) -> Option<StreamSink<'s>> {
    match sink {
        Some(sink) => Some(&mut **sink),
        None => None,
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
