use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Agent CLI provider selection.
///
/// Closed set: every match over providers stays exhaustive, so adding a
/// provider forces every template and table to be revisited.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Reference provider; the target of capability parity.
    #[default]
    Claude,
    Codex,
    Omp,
    Opencode,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [Self::Claude, Self::Codex, Self::Omp, Self::Opencode];

    /// Returns the wire name for this provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Omp => "omp",
            Self::Opencode => "opencode",
        }
    }

    /// Normalize arbitrary user input into a provider id.
    ///
    /// Total: empty or unrecognized input maps to the default provider.
    pub fn normalize(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    /// Whether `value` names a supported provider (case-insensitive).
    pub fn is_known(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }

    /// Installation hint surfaced when the provider binary is missing.
    pub fn install_hint(&self) -> &'static str {
        match self {
            Self::Claude => "Install/auth via Claude Code, then run: claude login",
            Self::Codex => {
                "Install/setup Codex CLI: https://developers.openai.com/codex/cli/reference"
            }
            Self::Omp => {
                "Install/setup Oh-My-Pi CLI: https://github.com/can1357/oh-my-pi?tab=readme-ov-file#cli-reference"
            }
            Self::Opencode => "Install/setup Opencode CLI: https://opencode.ai/docs/cli/",
        }
    }

    /// Channel used to deliver the task body to this provider.
    pub fn prompt_transport(&self) -> PromptTransport {
        match self {
            Self::Claude => PromptTransport::Stdin,
            Self::Codex | Self::Omp | Self::Opencode => PromptTransport::Argv,
        }
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "omp" => Ok(Self::Omp),
            "opencode" => Ok(Self::Opencode),
            other => Err(format!(
                "Invalid provider '{other}'. Valid values: claude, codex, omp, opencode"
            )),
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prompt transport channel used to send the task body to a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptTransport {
    Argv,
    Stdin,
}

/// One-shot prompt task categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptKind {
    Analysis,
    StackDetection,
    Generation,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::StackDetection => "stack-detection",
            Self::Generation => "generation",
        }
    }
}

/// Category of a single provider invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Prompt(PromptKind),
    /// Long-running coding session with filesystem/tool access.
    Session,
}

impl TaskKind {
    /// Phase label used by run logs.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Prompt(kind) => kind.as_str(),
            Self::Session => "agent",
        }
    }
}

/// How raw provider stdout is rendered for humans.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum StreamRenderMode {
    /// Assistant text deltas only.
    #[default]
    AssistantText,
    /// Assistant text plus bracketed lifecycle markers.
    Compact,
    /// Every line verbatim.
    Raw,
}

impl StreamRenderMode {
    /// Lenient parse used for environment overrides.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assistant_text" | "assistant-text" => Some(Self::AssistantText),
            "compact" => Some(Self::Compact),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }
}

/// Output format for CLI responses
#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
