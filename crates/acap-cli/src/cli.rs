use std::path::PathBuf;

use acap_core::{OutputFormat, PromptKind, ProviderId, StreamRenderMode};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "acap")]
#[command(about = "Agent CLI adapter: run prompts and sessions on claude, codex, omp, or opencode")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Also write diagnostics to {DIR}/logs/run-{timestamp}.log
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show provider capabilities and parity gaps
    Caps {
        /// Single provider; all providers when omitted
        #[arg(long, value_enum)]
        provider: Option<ProviderId>,
    },

    /// Run a one-shot prompt task
    Prompt {
        #[command(flatten)]
        target: TargetArgs,

        /// Task category
        #[arg(long, value_enum, default_value = "analysis")]
        kind: PromptKind,

        /// Comma-separated tool categories (default: Edit,Bash,Task)
        #[arg(long)]
        allowed_tools: Option<String>,

        /// Extract one JSON object from the output
        #[arg(long)]
        json: bool,

        /// Keys the extracted object must carry (comma-separated; implies --json)
        #[arg(long, value_delimiter = ',')]
        required_keys: Vec<String>,

        /// Reject objects with keys beyond --required-keys
        #[arg(long, requires = "required_keys")]
        exact: bool,
    },

    /// Run an autonomous coding session
    Session {
        #[command(flatten)]
        target: TargetArgs,

        /// Sandbox/permission settings file (required for claude)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Stream rendering (assistant_text, compact, raw)
        #[arg(long, value_enum)]
        stream_mode: Option<StreamRenderMode>,

        /// Render thinking deltas
        #[arg(long)]
        show_thinking: bool,

        /// Skip the JSONL run log
        #[arg(long)]
        no_run_log: bool,
    },

    /// Show the newest JSONL run log
    Logs {
        /// Number of trailing records to print
        #[arg(long, default_value_t = 20)]
        tail: usize,

        /// Run log directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Show/manage configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

/// Provider selection and task text shared by prompt and session runs.
#[derive(clap::Args)]
pub struct TargetArgs {
    /// Task prompt; reads from stdin if omitted
    pub prompt: Option<String>,

    /// Provider (defaults to the configured default_provider)
    #[arg(long, value_enum)]
    pub provider: Option<ProviderId>,

    /// Override the provider's default model
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(long, default_value = "")]
    pub system_prompt: String,

    /// Working directory (defaults to CWD)
    #[arg(long)]
    pub cd: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print a commented configuration template
    Template,
    /// Print the configuration file path
    Path,
}
