//! Core types shared across the acap workspace: provider ids, the capability
//! registry, and the typed error taxonomy.

pub mod capabilities;
pub mod error;
pub mod types;

pub use capabilities::{ProviderCapabilities, capabilities};
pub use error::AppError;
pub use types::{
    OutputFormat, PromptKind, PromptTransport, ProviderId, StreamRenderMode, TaskKind,
};
