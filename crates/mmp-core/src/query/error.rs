use crate::store::error::StoreError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No data set named '{0}' is registered")]
    UnknownDataSet(String),
    #[error("Failed to load data set: {0}")]
    Store(#[from] StoreError),
    #[error("Export failed: {0}")]
    Export(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
