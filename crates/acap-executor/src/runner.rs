use std::path::{Path, PathBuf};

use acap_core::{AppError, ProviderId};
use acap_process::{ExecutionResult, StreamSink, run_streaming};
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::command::CommandPlan;

/// Launch seam between planned commands and real processes.
/// Implementations: [`LocalRunner`] (child processes); tests script results.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Locate a provider binary before launching it.
    fn resolve_binary(&self, provider: ProviderId, binary: &str) -> Result<PathBuf> {
        which::which(binary).map_err(|err| {
            debug!(%provider, binary, error = %err, "binary lookup failed");
            anyhow::Error::from(AppError::ProviderNotInstalled {
                provider,
                binary: binary.to_string(),
                hint: provider.install_hint(),
            })
        })
    }

    /// Run one plan to completion in `cwd`, forwarding lines to `sink`.
    async fn run(
        &self,
        plan: &CommandPlan,
        cwd: &Path,
        sink: Option<StreamSink<'_>>,
    ) -> Result<ExecutionResult>;
}

/// Runs plans as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(
        &self,
        plan: &CommandPlan,
        cwd: &Path,
        sink: Option<StreamSink<'_>>,
    ) -> Result<ExecutionResult> {
        run_streaming(plan.to_command(cwd), plan.stdin_bytes(), sink).await
    }
}
