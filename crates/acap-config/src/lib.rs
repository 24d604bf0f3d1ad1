pub mod config;

pub use config::{
    AgentCliConfig, PolicyConfig, ProviderConfig, RunLogConfig, StreamConfig,
    builtin_default_model, parse_bool,
};
