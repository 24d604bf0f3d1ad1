use super::*;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use acap_process::StreamName;
use async_trait::async_trait;

/// Runner that records every plan and replays queued results.
#[derive(Default)]
struct ScriptedRunner {
    results: Mutex<VecDeque<ExecutionResult>>,
    plans: Mutex<Vec<CommandPlan>>,
}

impl ScriptedRunner {
    fn with_results(results: impl IntoIterator<Item = ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            plans: Mutex::default(),
        }
    }

    fn plans(&self) -> Vec<CommandPlan> {
        self.plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    fn resolve_binary(&self, _provider: ProviderId, binary: &str) -> Result<PathBuf> {
        Ok(PathBuf::from(binary))
    }

    async fn run(
        &self,
        plan: &CommandPlan,
        _cwd: &Path,
        mut sink: Option<StreamSink<'_>>,
    ) -> Result<ExecutionResult> {
        self.plans.lock().unwrap().push(plan.clone());
        let result = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted result left");
        if let Some(sink) = sink.as_mut() {
            for (stream, text) in [
                (StreamName::Stdout, &result.stdout),
                (StreamName::Stderr, &result.stderr),
            ] {
                for line in text.lines() {
                    sink(&StreamEvent {
                        stream,
                        line: line.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }
}

fn exit(code: i32, stdout: &str, stderr: &str) -> ExecutionResult {
    ExecutionResult {
        exit_code: code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        summary: String::new(),
    }
}

fn spec(provider: ProviderId) -> TaskSpec {
    TaskSpec::new(provider, "test-model", "Be precise.", "Do the work.", "/tmp")
}

fn generation_keys() -> ExtractOptions {
    ExtractOptions::new(["app_spec", "initializer_prompt", "coding_prompt"], true)
}

const BYPASS: &str = "--dangerously-bypass-approvals-and-sandbox";

#[tokio::test]
async fn test_approval_fallback_runs_exactly_twice() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([
        exit(1, "", "approval required"),
        exit(0, "all done\n", ""),
    ]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let result = executor
        .run_agent_task(&spec(ProviderId::Codex), None)
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0, "caller sees the second attempt");
    assert_eq!(result.stdout, "all done\n");
    let plans = executor.runner().plans();
    assert_eq!(plans.len(), 2, "exactly one retry");
    assert!(!plans[0].has_arg(BYPASS));
    assert!(plans[1].has_arg(BYPASS));
}

#[tokio::test]
async fn test_approval_fallback_returns_second_failure() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([
        exit(1, "", "approval required"),
        exit(1, "", "approval required"),
    ]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let result = executor
        .run_agent_task(&spec(ProviderId::Codex), None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 1);
    assert_eq!(executor.runner().plans().len(), 2, "never a third attempt");
}

#[tokio::test]
async fn test_no_fallback_unless_both_toggles_enabled() {
    for (auto_approve, dangerous) in [(true, false), (false, true), (false, false)] {
        let mut config = AgentCliConfig::default();
        config.policy.auto_approve_fallback = auto_approve;
        config.policy.dangerous_fallback = dangerous;
        let runner = ScriptedRunner::with_results([exit(1, "", "approval required")]);
        let executor = TaskExecutor::with_runner(&config, runner);

        let result = executor
            .run_agent_task(&spec(ProviderId::Codex), None)
            .await
            .unwrap();
        assert_eq!(result.exit_code, 1);
        assert_eq!(
            executor.runner().plans().len(),
            1,
            "auto_approve={auto_approve} dangerous={dangerous}"
        );
    }
}

#[tokio::test]
async fn test_no_fallback_for_unrelated_failure() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([exit(3, "", "model not found")]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let result = executor
        .run_agent_task(&spec(ProviderId::Codex), None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 3);
    assert_eq!(executor.runner().plans().len(), 1);
}

#[tokio::test]
async fn test_no_fallback_without_bypass_flags() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([exit(1, "", "approval required")]);
    let executor = TaskExecutor::with_runner(&config, runner);

    executor
        .run_agent_task(&spec(ProviderId::Opencode), None)
        .await
        .unwrap();
    assert_eq!(executor.runner().plans().len(), 1);
}

#[tokio::test]
async fn test_claude_session_without_settings_never_launches() {
    let config = AgentCliConfig::default();
    let executor = TaskExecutor::with_runner(&config, ScriptedRunner::default());

    let err = executor
        .run_agent_task(&spec(ProviderId::Claude), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::MissingSettingsFile { .. })
    ));
    assert!(executor.runner().plans().is_empty());
}

#[tokio::test]
async fn test_fallback_streams_both_attempts_to_sink() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([
        exit(1, "", "approval required"),
        exit(0, "second\n", ""),
    ]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let mut seen = Vec::new();
    let mut sink = |event: &StreamEvent| seen.push(event.line.clone());
    executor
        .run_agent_task(&spec(ProviderId::Codex), Some(&mut sink))
        .await
        .unwrap();
    assert_eq!(seen, vec!["approval required", "second"]);
}

#[tokio::test]
async fn test_prompt_task_returns_nonzero_exit_as_value() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([exit(2, "", "boom")]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let result = executor
        .run_prompt_task(PromptKind::Analysis, &spec(ProviderId::Omp), None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 2);
    assert_eq!(result.stderr, "boom");
}

#[tokio::test]
async fn test_structured_task_recovers_object_from_noise() {
    let config = AgentCliConfig::default();
    let stdout = "Thinking...\n```json\n{\"stack\": \"rust\", \"tests\": \"cargo test\"}\n```\nDone.";
    let runner = ScriptedRunner::with_results([exit(0, stdout, "")]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let object = executor
        .run_structured_task(
            PromptKind::StackDetection,
            &spec(ProviderId::Opencode),
            &ExtractOptions::new(["stack", "tests"], false),
            None,
        )
        .await
        .unwrap();
    assert_eq!(object["stack"], "rust");

    let plans = executor.runner().plans();
    let shimmed = plans[0].shimmed_prompt.as_deref().unwrap();
    assert!(
        shimmed.contains("=== OUTPUT CONTRACT ==="),
        "structured tasks always request JSON"
    );
}

#[tokio::test]
async fn test_structured_task_nonzero_exit_is_task_failed() {
    let config = AgentCliConfig::default();
    let long_stderr = "x".repeat(900);
    let runner = ScriptedRunner::with_results([exit(4, "", &long_stderr), exit(1, "{}", "")]);
    let executor = TaskExecutor::with_runner(&config, runner);
    let options = ExtractOptions::default();

    let err = executor
        .run_structured_task(PromptKind::Analysis, &spec(ProviderId::Codex), &options, None)
        .await
        .unwrap_err();
    match err.downcast_ref::<AppError>() {
        Some(AppError::TaskFailed {
            provider,
            exit_code,
            stderr,
        }) => {
            assert_eq!(*provider, ProviderId::Codex);
            assert_eq!(*exit_code, 4);
            assert_eq!(stderr.chars().count(), 500);
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }

    let err = executor
        .run_structured_task(PromptKind::Analysis, &spec(ProviderId::Codex), &options, None)
        .await
        .unwrap_err();
    assert!(err.to_string().ends_with("(no stderr)"), "got: {err}");
}

#[tokio::test]
async fn test_structured_task_extraction_error_is_downcastable() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([exit(0, "no json here", "")]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let err = executor
        .run_structured_task(
            PromptKind::Analysis,
            &spec(ProviderId::Claude),
            &ExtractOptions::new(["summary"], false),
            None,
        )
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<ExtractError>().is_some(), "got: {err}");
}

#[tokio::test]
async fn test_generation_repair_then_success() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([
        exit(
            0,
            "```json\n{\"app_spec\":\"<x>\",\"initializer_prompt\": \"oops\"\n```",
            "",
        ),
        exit(
            0,
            r##"{"app_spec":"<project_specification/>","initializer_prompt":"# init","coding_prompt":"# code"}"##,
            "",
        ),
    ]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let object = executor
        .run_generation_task(&spec(ProviderId::Claude), &generation_keys(), None)
        .await
        .unwrap();
    assert_eq!(object["coding_prompt"], "# code");

    let plans = executor.runner().plans();
    assert_eq!(plans.len(), 2);
    let repair = plans[1].stdin.as_deref().unwrap();
    assert!(repair.starts_with("Do the work."));
    assert!(repair.contains("Your previous response could not be used."));
    assert!(repair.contains("Could not extract valid JSON"));
    assert!(repair.contains("exactly these keys: app_spec, coding_prompt, initializer_prompt"));
}

#[tokio::test]
async fn test_generation_repair_then_failure() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([
        exit(0, r#"{"app_spec":"x","initializer_prompt":"y""#, ""),
        exit(0, r#"{"app_spec":"x"}"#, ""),
    ]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let err = executor
        .run_generation_task(&spec(ProviderId::Claude), &generation_keys(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::GenerationFailed { .. })
    ));
    assert!(err.to_string().starts_with("Generation failed after one retry"));
    assert!(err.to_string().contains("Missing required keys"));
    assert_eq!(executor.runner().plans().len(), 2);
}

#[tokio::test]
async fn test_generation_task_failure_is_not_repaired() {
    let config = AgentCliConfig::default();
    let runner = ScriptedRunner::with_results([exit(1, "", "auth expired")]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let err = executor
        .run_generation_task(&spec(ProviderId::Codex), &generation_keys(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::TaskFailed { .. })
    ));
    assert_eq!(executor.runner().plans().len(), 1);
}

#[tokio::test]
async fn test_logged_agent_task_writes_lifecycle_and_stream_records() {
    let tmp = tempfile::tempdir().unwrap();
    let config = AgentCliConfig::default();
    let omp_line = r#"{"type":"message_update","assistantMessageEvent":{"type":"text_delta","delta":"hello"}}"#;
    let runner = ScriptedRunner::with_results([exit(0, &format!("{omp_line}\n"), "warn line\n")]);
    let executor = TaskExecutor::with_runner(&config, runner);

    let mut logger = RunLogger::create(
        true,
        tmp.path(),
        ProviderId::Omp,
        "test-model",
        Path::new("/tmp"),
    );
    let cleaner = StreamCleaner::default();
    let mut rendered = Vec::new();
    let mut render = |stream: StreamName, line: &str| rendered.push((stream, line.to_string()));

    let result = executor
        .run_logged_agent_task(&spec(ProviderId::Omp), &mut logger, &cleaner, &mut render)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(
        rendered,
        vec![
            (StreamName::Stdout, "hello".to_string()),
            (StreamName::Stderr, "warn line".to_string()),
        ]
    );

    let content = std::fs::read_to_string(logger.log_file().unwrap()).unwrap();
    let events: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["message"], "session_started");
    assert_eq!(events[1]["event_type"], "stream");
    assert_eq!(events[1]["message"], omp_line, "raw line is logged");
    assert_eq!(events[2]["stream"], "stderr");
    assert_eq!(events[3]["message"], "session_finished");
    assert_eq!(events[3]["meta"]["return_code"], "0");
    assert!(events.iter().all(|e| e["phase"] == "agent"));
}

#[tokio::test]
async fn test_logged_agent_task_records_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = AgentCliConfig::default();
    let executor = TaskExecutor::with_runner(&config, ScriptedRunner::default());
    let mut logger = RunLogger::create(true, tmp.path(), ProviderId::Claude, "m", Path::new("."));
    let mut render = |_: StreamName, _: &str| {};

    let result = executor
        .run_logged_agent_task(
            &spec(ProviderId::Claude),
            &mut logger,
            &StreamCleaner::default(),
            &mut render,
        )
        .await;
    assert!(result.is_err());

    let content = std::fs::read_to_string(logger.log_file().unwrap()).unwrap();
    let last: serde_json::Value = serde_json::from_str(content.lines().last().unwrap()).unwrap();
    assert_eq!(last["message"], "session_finished");
    assert!(
        last["meta"]["error"]
            .as_str()
            .unwrap()
            .contains("settings file is required")
    );
}

#[tokio::test]
async fn test_missing_binary_is_provider_not_installed() {
    let mut config = AgentCliConfig::default();
    config.providers.insert(
        "codex".into(),
        acap_config::ProviderConfig {
            binary: Some("acap-test-no-such-binary-7f3a".into()),
            model: None,
        },
    );
    let executor = TaskExecutor::new(&config);

    let err = executor
        .run_prompt_task(PromptKind::Analysis, &spec(ProviderId::Codex), None)
        .await
        .unwrap_err();
    match err.downcast_ref::<AppError>() {
        Some(AppError::ProviderNotInstalled {
            provider, binary, ..
        }) => {
            assert_eq!(*provider, ProviderId::Codex);
            assert_eq!(binary, "acap-test-no-such-binary-7f3a");
        }
        other => panic!("expected ProviderNotInstalled, got {other:?}"),
    }
}

#[test]
fn test_degraded_capability_warning() {
    let config = AgentCliConfig::default();
    assert_eq!(
        degraded_capability_warning(ProviderId::Codex, &config).as_deref(),
        Some(
            "Reduced capability parity for provider 'codex': system prompt is shimmed into \
             user prompt, tool policy is prompt-based (best effort)."
        )
    );
    assert!(degraded_capability_warning(ProviderId::Claude, &config).is_none());

    let mut quiet = AgentCliConfig::default();
    quiet.policy.warn_on_degraded_caps = false;
    assert!(degraded_capability_warning(ProviderId::Opencode, &quiet).is_none());
}

#[test]
fn test_repair_prompt_without_required_keys() {
    let err = acap_output::extract_json_object("nope", &ExtractOptions::default()).unwrap_err();
    let prompt = repair_prompt("Generate.", &err, &ExtractOptions::default());
    assert!(prompt.contains("Respond again with ONLY one valid JSON object."));
    assert!(!prompt.contains("these keys"));
}
