use mmpairs::core::canonical::Canonicalizer;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid structure code '{input}': {reason}")]
    InvalidStructure { input: String, reason: String },

    #[error("Expected one or two keys, got {0}.")]
    KeyCount(usize),

    #[error("Fragment '{0}' carries no R-group marker.")]
    MissingMarker(String),
}

/// Parses a structure code and returns its canonical ID.
pub fn canonical_id(canonicalizer: &dyn Canonicalizer, input: &str) -> Result<String, ParseError> {
    let molecule = canonicalizer
        .parse(input.trim())
        .map_err(|e| ParseError::InvalidStructure {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
    Ok(canonicalizer.canonicalize(&molecule.strip_hydrogens()))
}

/// Parses a fragment code, which must carry at least one R-group marker.
pub fn fragment_id(canonicalizer: &dyn Canonicalizer, input: &str) -> Result<String, ParseError> {
    let molecule = canonicalizer
        .parse(input.trim())
        .map_err(|e| ParseError::InvalidStructure {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
    if molecule.markers().is_empty() {
        return Err(ParseError::MissingMarker(input.to_string()));
    }
    Ok(canonicalizer.canonicalize(&molecule.strip_hydrogens()))
}

/// Canonicalizes the key fragments of a query, in order.
pub fn key_ids(canonicalizer: &dyn Canonicalizer, keys: &[String]) -> Result<Vec<String>, ParseError> {
    if keys.is_empty() || keys.len() > 2 {
        return Err(ParseError::KeyCount(keys.len()));
    }
    keys.iter().map(|k| fragment_id(canonicalizer, k)).collect()
}
