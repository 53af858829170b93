use crate::core::models::ids::FragmentIndex;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Missing block <{0}>")]
    MissingBlock(&'static str),
    #[error("Header field '{name}' is missing or malformed: {reason}")]
    HeaderField { name: &'static str, reason: String },
    #[error("Unsupported format version '{0}'")]
    UnsupportedVersion(String),
    #[error("Block <{block}> holds {found} rows, but the header announces {expected}")]
    RowCount {
        block: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Malformed row on line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },
    #[error("Line {line} references {kind} {index}, but only {available} exist")]
    IndexOutOfRange {
        line: usize,
        kind: &'static str,
        index: usize,
        available: usize,
    },
    #[error("Fingerprint of fragment {0} has not been computed")]
    MissingFingerprint(FragmentIndex),
}
