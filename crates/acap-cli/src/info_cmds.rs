use std::path::PathBuf;

use acap_config::AgentCliConfig;
use acap_core::{OutputFormat, ProviderId};
use acap_output::{find_latest_run_log, read_last_lines};
use anyhow::Result;
use serde::Serialize;

#[derive(Serialize)]
struct ProviderReport {
    provider: ProviderId,
    binary: String,
    default_model: String,
    installed: bool,
    capabilities: acap_core::ProviderCapabilities,
    gaps: Vec<&'static str>,
}

fn provider_report(provider: ProviderId, config: &AgentCliConfig) -> ProviderReport {
    let binary = config.binary(provider).to_string();
    let caps = provider.capabilities();
    ProviderReport {
        provider,
        installed: which::which(&binary).is_ok(),
        binary,
        default_model: config.default_model(provider).to_string(),
        capabilities: caps,
        gaps: if provider == ProviderId::Claude {
            Vec::new()
        } else {
            caps.degraded_gaps()
        },
    }
}

pub(crate) fn handle_caps(
    provider: Option<ProviderId>,
    config: &AgentCliConfig,
    format: OutputFormat,
) -> Result<()> {
    let providers: Vec<ProviderId> = match provider {
        Some(p) => vec![p],
        None => ProviderId::ALL.to_vec(),
    };
    let reports: Vec<ProviderReport> = providers
        .into_iter()
        .map(|p| provider_report(p, config))
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => print!("{}", render_caps_text(&reports)),
    }
    Ok(())
}

fn render_caps_text(reports: &[ProviderReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let caps = &report.capabilities;
        let flag = |on: bool| if on { "yes" } else { "no" };
        out.push_str(&format!(
            "{} (binary: {}, model: {}, installed: {})\n",
            report.provider,
            report.binary,
            report.default_model,
            flag(report.installed)
        ));
        out.push_str(&format!(
            "  system_prompt={} append_system_prompt={} tool_allowlist={} sandbox={} approval={} json_stream={} resume={}\n",
            flag(caps.native_system_prompt),
            flag(caps.native_append_system_prompt),
            flag(caps.native_tool_allowlist),
            flag(caps.native_sandbox_policy),
            flag(caps.native_approval_policy),
            flag(caps.json_stream),
            flag(caps.session_resume),
        ));
        for gap in &report.gaps {
            out.push_str(&format!("  gap: {gap}\n"));
        }
    }
    out
}

pub(crate) fn handle_logs(tail: usize, dir: Option<PathBuf>, config: &AgentCliConfig) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.run_log_dir());
    let Some(path) = find_latest_run_log(&dir) else {
        anyhow::bail!("No run logs found in {}", dir.display());
    };
    eprintln!("Latest run log: {}", path.display());
    for line in read_last_lines(&path, tail)? {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn handle_config_show(config: &AgentCliConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}
