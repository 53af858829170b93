use crate::error::{CliError, Result};
use mmpairs::query::dataset::DataSet;
use std::path::Path;
use tracing::info;

pub mod build;
pub mod fields;
pub mod space;
pub mod transform;

fn load_dataset(path: &Path) -> Result<DataSet> {
    info!(path = %path.display(), "Loading data set.");
    let dataset = DataSet::load(path).map_err(|source| CliError::DataSet {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        name = dataset.name(),
        molecules = dataset.molecule_count(),
        pairs = dataset.pair_count(),
        "Data set loaded."
    );
    Ok(dataset)
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}
