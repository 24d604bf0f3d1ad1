use super::*;
use serial_test::serial;

fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
    move |key| {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }
}

fn restore_env_var(key: &str, original: Option<String>) {
    // SAFETY: test-scoped env mutation serialized via #[serial].
    unsafe {
        match original {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}

#[test]
fn test_default_config() {
    let config = AgentCliConfig::default();
    assert_eq!(config.default_provider, ProviderId::Claude);
    assert!(config.providers.is_empty());
    assert!(config.policy.warn_on_degraded_caps);
    assert!(config.policy.require_json_output);
    assert!(config.policy.non_interactive);
    assert!(config.policy.bypass_fallback_enabled());
    assert!(config.run_log.enabled);
    assert_eq!(config.stream.mode, StreamRenderMode::AssistantText);
    assert!(!config.stream.show_thinking);
}

#[test]
fn test_binary_defaults_to_wire_name() {
    let config = AgentCliConfig::default();
    for provider in ProviderId::ALL {
        assert_eq!(config.binary(provider), provider.as_str());
    }
}

#[test]
fn test_default_models() {
    let config = AgentCliConfig::default();
    assert_eq!(config.default_model(ProviderId::Claude), "claude-sonnet-4-6");
    assert_eq!(config.default_model(ProviderId::Codex), "gpt-5-codex");
    assert_eq!(config.default_model(ProviderId::Omp), "claude-sonnet-4-5");
    assert_eq!(config.default_model(ProviderId::Opencode), "claude-sonnet-4-5");
}

#[test]
fn test_resolve_model_prefers_non_empty_override() {
    let config = AgentCliConfig::default();
    assert_eq!(
        config.resolve_model(ProviderId::Codex, Some("o4-mini")),
        "o4-mini"
    );
    assert_eq!(
        config.resolve_model(ProviderId::Codex, Some("   ")),
        "gpt-5-codex",
        "blank override should fall back to the provider default"
    );
    assert_eq!(config.resolve_model(ProviderId::Codex, None), "gpt-5-codex");
}

#[test]
fn test_parse_toml() {
    let toml_str = r#"
default_provider = "omp"

[policy]
dangerous_fallback = false

[providers.omp]
binary = "/opt/omp/bin/omp"

[providers.codex]
model = "gpt-5"

[stream]
mode = "compact"
show_thinking = true
"#;
    let config: AgentCliConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.default_provider, ProviderId::Omp);
    assert_eq!(config.binary(ProviderId::Omp), "/opt/omp/bin/omp");
    assert_eq!(config.default_model(ProviderId::Omp), "claude-sonnet-4-5");
    assert_eq!(config.default_model(ProviderId::Codex), "gpt-5");
    assert!(config.policy.auto_approve_fallback);
    assert!(!config.policy.dangerous_fallback);
    assert!(
        !config.policy.bypass_fallback_enabled(),
        "fallback must require both toggles"
    );
    assert_eq!(config.stream.mode, StreamRenderMode::Compact);
    assert!(config.stream.show_thinking);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[run_log]\nenabled = false\ndir = \"/tmp/acap-runs\"\n").unwrap();

    let config = AgentCliConfig::load_from(&path).unwrap();
    assert!(!config.run_log.enabled);
    assert_eq!(config.run_log_dir(), PathBuf::from("/tmp/acap-runs"));
}

#[test]
fn test_load_from_invalid_toml_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "default_provider = [").unwrap();

    let err = AgentCliConfig::load_from(&path).unwrap_err();
    assert!(
        format!("{err:#}").contains("Failed to parse agent config"),
        "error should carry context, got: {err:#}"
    );
}

#[test]
fn test_default_template_parses() {
    let template = AgentCliConfig::default_template();
    let config: AgentCliConfig = toml::from_str(&template).unwrap();
    assert_eq!(config, AgentCliConfig::default());
}

#[test]
fn test_parse_bool_values() {
    for truthy in ["1", "true", "YES", " on "] {
        assert_eq!(parse_bool(truthy), Some(true), "{truthy:?}");
    }
    for falsy in ["0", "False", "no", "OFF"] {
        assert_eq!(parse_bool(falsy), Some(false), "{falsy:?}");
    }
    assert_eq!(parse_bool("maybe"), None);
    assert_eq!(parse_bool(""), None);
}

#[test]
fn test_overrides_apply_provider_and_toggles() {
    let mut config = AgentCliConfig::default();
    config.apply_overrides_from(lookup_from(&[
        ("AGENT_CLI_ID", "Codex"),
        ("AGENT_CLI_BIN_CODEX", "/usr/local/bin/codex"),
        ("AGENT_CLI_MODEL_OPENCODE", "gpt-4.1"),
        ("AGENT_CLI_NON_INTERACTIVE", "off"),
        ("AGENT_CLI_DANGEROUS_FALLBACK", "0"),
        ("AGENT_RUN_LOG_DIR", "/var/log/acap"),
        ("AGENT_STREAM_STDOUT_MODE", "raw"),
        ("AGENT_STREAM_SHOW_THINKING", "yes"),
    ]));

    assert_eq!(config.default_provider, ProviderId::Codex);
    assert_eq!(config.binary(ProviderId::Codex), "/usr/local/bin/codex");
    assert_eq!(config.default_model(ProviderId::Opencode), "gpt-4.1");
    assert!(!config.policy.non_interactive);
    assert!(!config.policy.dangerous_fallback);
    assert!(config.policy.auto_approve_fallback);
    assert_eq!(config.run_log_dir(), PathBuf::from("/var/log/acap"));
    assert_eq!(config.stream.mode, StreamRenderMode::Raw);
    assert!(config.stream.show_thinking);
}

#[test]
fn test_unparseable_overrides_keep_previous_values() {
    let mut config = AgentCliConfig::default();
    config.policy.require_json_output = false;
    config.apply_overrides_from(lookup_from(&[
        ("AGENT_CLI_REQUIRE_JSON_OUTPUT", "sometimes"),
        ("AGENT_STREAM_STDOUT_MODE", "verbose"),
        ("AGENT_CLI_BIN_OMP", "  "),
    ]));

    assert!(!config.policy.require_json_output);
    assert_eq!(config.stream.mode, StreamRenderMode::AssistantText);
    assert_eq!(config.binary(ProviderId::Omp), "omp");
}

#[test]
fn test_unknown_provider_id_override_normalizes_to_default() {
    let mut config = AgentCliConfig {
        default_provider: ProviderId::Omp,
        ..Default::default()
    };
    config.apply_overrides_from(lookup_from(&[("AGENT_CLI_ID", "gemini")]));
    assert_eq!(config.default_provider, ProviderId::Claude);
}

#[test]
#[serial]
fn test_apply_env_overrides_reads_process_env() {
    let original = std::env::var("AGENT_CLI_WARN_ON_DEGRADED_CAPS").ok();
    // SAFETY: serialized with other env-mutating tests.
    unsafe { std::env::set_var("AGENT_CLI_WARN_ON_DEGRADED_CAPS", "false") };

    let mut config = AgentCliConfig::default();
    config.apply_env_overrides();

    restore_env_var("AGENT_CLI_WARN_ON_DEGRADED_CAPS", original);
    assert!(!config.policy.warn_on_degraded_caps);
}
