use super::load_dataset;
use crate::cli::SpaceArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use mmpairs::core::canonical::GraphCodec;
use mmpairs::query::engine::QueryEngine;

pub fn run(args: SpaceArgs) -> Result<()> {
    let codec = GraphCodec::new();
    let keys =
        parser::key_ids(&codec, &args.keys).map_err(|e| CliError::Argument(e.to_string()))?;
    let dataset = load_dataset(&args.dataset)?;
    let engine = QueryEngine::new(&dataset, &codec);

    println!("Chemical space size: {}", engine.chemical_space_size(&keys));
    if !args.count {
        for row in engine.chemical_space(&keys) {
            println!("{}\t{}\t{}", row.index, row.name, row.id_code);
        }
    }
    Ok(())
}
