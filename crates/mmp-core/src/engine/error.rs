use thiserror::Error;

use super::config::ConfigError;
use crate::core::canonical::CanonicalError;
use crate::core::io::source::SourceError;
use crate::core::models::ids::FragmentIndex;
use crate::store::error::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Input error: {0}")]
    Source(#[from] SourceError),

    #[error("Structure code error: {0}")]
    Canonical(#[from] CanonicalError),

    #[error("Data set store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Fragment index {0} is not in the dictionary")]
    UnknownFragment(FragmentIndex),

    #[error("Build phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: &'static str, reason: String },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
