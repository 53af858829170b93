use mmpairs::core::io::source::SourceError;
use mmpairs::engine::error::EngineError;
use mmpairs::query::error::QueryError;
use mmpairs::store::error::StoreError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Failed to read input table: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to load data set '{path}': {source}", path = path.display())]
    DataSet {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
