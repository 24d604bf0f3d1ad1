use std::io::Read;
use std::path::PathBuf;

use acap_config::AgentCliConfig;
use acap_core::{OutputFormat, PromptKind, StreamRenderMode, TaskKind};
use acap_executor::{ExecutionResult, TaskExecutor, TaskSpec};
use acap_output::{ExtractOptions, RunLogger, StreamCleaner};
use acap_process::{StreamEvent, StreamName};
use anyhow::{Context, Result};
use tracing::info;

use crate::cli::TargetArgs;

#[allow(clippy::too_many_arguments)]
pub(crate) async fn handle_prompt(
    target: TargetArgs,
    kind: PromptKind,
    allowed_tools: Option<String>,
    json: bool,
    required_keys: Vec<String>,
    exact: bool,
    config: &AgentCliConfig,
    format: OutputFormat,
) -> Result<i32> {
    let mut spec = task_spec(target, config)?;
    if let Some(tools) = allowed_tools {
        spec = spec.with_allowed_tools(tools);
    }

    let executor = TaskExecutor::new(config);
    let mut logger = run_logger(config.run_log.enabled, &spec, config);
    let phase = TaskKind::Prompt(kind).phase();
    let mut sink = |event: &StreamEvent| logger.log_stream(phase, event.stream, &event.line);

    if json || !required_keys.is_empty() {
        let options = ExtractOptions::new(required_keys, exact);
        let object = match kind {
            PromptKind::Generation => {
                executor
                    .run_generation_task(&spec, &options, Some(&mut sink))
                    .await?
            }
            PromptKind::Analysis | PromptKind::StackDetection => {
                executor
                    .run_structured_task(kind, &spec, &options, Some(&mut sink))
                    .await?
            }
        };
        println!("{}", serde_json::to_string_pretty(&object)?);
        return Ok(0);
    }

    let result = executor
        .run_prompt_task(kind, &spec, Some(&mut sink))
        .await?;
    print!("{}", render_result(&result, &format)?);
    report_failure(&result);
    Ok(result.exit_code)
}

pub(crate) async fn handle_session(
    target: TargetArgs,
    settings: Option<PathBuf>,
    stream_mode: Option<StreamRenderMode>,
    show_thinking: bool,
    no_run_log: bool,
    config: &AgentCliConfig,
    format: OutputFormat,
) -> Result<i32> {
    let mut spec = task_spec(target, config)?;
    if let Some(settings) = settings {
        spec = spec.with_settings_file(settings);
    }

    let cleaner = StreamCleaner::new(
        stream_mode.unwrap_or(config.stream.mode),
        show_thinking || config.stream.show_thinking,
    );
    let mut logger = run_logger(config.run_log.enabled && !no_run_log, &spec, config);
    let stream_to_stdout = matches!(format, OutputFormat::Text);
    // Provider stderr always goes to our stderr; JSON mode keeps stdout for the record.
    let mut render = |stream: StreamName, line: &str| match stream {
        StreamName::Stdout if stream_to_stdout => println!("{line}"),
        StreamName::Stdout => {}
        StreamName::Stderr => eprintln!("{line}"),
    };

    let executor = TaskExecutor::new(config);
    let result = executor
        .run_logged_agent_task(&spec, &mut logger, &cleaner, &mut render)
        .await?;

    if !stream_to_stdout {
        print!("{}", render_result(&result, &format)?);
    }
    report_failure(&result);
    Ok(result.exit_code)
}

fn task_spec(target: TargetArgs, config: &AgentCliConfig) -> Result<TaskSpec> {
    let provider = target.provider.unwrap_or(config.default_provider);
    let model = config.resolve_model(provider, target.model.as_deref());
    let prompt = read_prompt(target.prompt)?;
    let working_dir = match target.cd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    Ok(TaskSpec::new(
        provider,
        model,
        target.system_prompt,
        prompt,
        working_dir,
    ))
}

fn run_logger(enabled: bool, spec: &TaskSpec, config: &AgentCliConfig) -> RunLogger {
    let logger = RunLogger::create(
        enabled,
        &config.run_log_dir(),
        spec.provider,
        &spec.model,
        &spec.working_dir,
    );
    if let Some(path) = logger.log_file() {
        info!(path = %path.display(), run_id = logger.run_id(), "run log");
    }
    logger
}

pub(crate) fn read_prompt(prompt: Option<String>) -> Result<String> {
    if let Some(p) = prompt {
        if p.trim().is_empty() {
            anyhow::bail!(
                "Empty prompt provided. Usage:\n  acap prompt \"your prompt here\"\n  echo \"prompt\" | acap prompt"
            );
        }
        return Ok(p);
    }

    use std::io::IsTerminal;
    if std::io::stdin().is_terminal() {
        anyhow::bail!(
            "No prompt provided and stdin is a terminal.\n\n\
             Usage:\n  \
             acap prompt \"your prompt here\"\n  \
             echo \"prompt\" | acap session --provider codex"
        );
    }
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    if buffer.trim().is_empty() {
        anyhow::bail!("Empty prompt from stdin. Provide a non-empty prompt.");
    }
    Ok(buffer)
}

/// Text: the provider's stdout verbatim. JSON: the whole result record.
pub(crate) fn render_result(result: &ExecutionResult, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(result.stdout.clone()),
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(result)?)),
    }
}

fn report_failure(result: &ExecutionResult) {
    if !result.success() {
        eprintln!("exit code {}: {}", result.exit_code, result.summary);
    }
}
