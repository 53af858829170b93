use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileFragmentationConfig {
    pub keys_min_atoms: Option<usize>,
    pub max_value_atoms: Option<usize>,
    pub hydrogen_variants: Option<bool>,
    pub double_cuts: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileInputConfig {
    pub structure_column: Option<String>,
    pub name_column: Option<String>,
    pub coordinates_column: Option<String>,
}

/// Build settings as written in a TOML configuration file.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub dataset_name: Option<String>,
    pub fragmentation: Option<FileFragmentationConfig>,
    pub input: Option<FileInputConfig>,
    /// Opaque lines copied into the data set's UI configuration block.
    pub ui_configuration: Option<Vec<String>>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
