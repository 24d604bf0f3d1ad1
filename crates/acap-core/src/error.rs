use crate::types::ProviderId;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("settings file is required for the {provider} provider in autonomous sessions")]
    MissingSettingsFile { provider: ProviderId },

    #[error(
        "Selected provider '{provider}' is not installed or not in PATH (binary: {binary}). {hint}"
    )]
    ProviderNotInstalled {
        provider: ProviderId,
        binary: String,
        hint: &'static str,
    },

    #[error("Failed to launch '{binary}': {reason}")]
    LaunchFailed { binary: String, reason: String },

    #[error("{provider} task failed with exit code {exit_code}: {stderr}")]
    TaskFailed {
        provider: ProviderId,
        exit_code: i32,
        /// Truncated stderr (or a placeholder when empty).
        stderr: String,
    },

    #[error("Generation failed after one retry.\nInitial error: {original}\nRetry error: {repair}")]
    GenerationFailed { original: String, repair: String },
}
