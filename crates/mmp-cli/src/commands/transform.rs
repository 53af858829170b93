use super::{format_optional, load_dataset};
use crate::cli::TransformArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use mmpairs::core::canonical::GraphCodec;
use mmpairs::query::engine::{QueryEngine, Transformation, TransformationQuery};
use mmpairs::query::export::export_transformations;
use std::fs::File;
use std::io::BufWriter;
use tracing::info;

pub fn run(args: TransformArgs) -> Result<()> {
    let codec = GraphCodec::new();
    let argument = |e: parser::ParseError| CliError::Argument(e.to_string());
    let query = TransformationQuery {
        molecule_id: parser::canonical_id(&codec, &args.molecule).map_err(argument)?,
        keys: parser::key_ids(&codec, &args.keys).map_err(argument)?,
        value: parser::fragment_id(&codec, &args.value).map_err(argument)?,
        min_delta: args.min_delta,
        max_delta: args.max_delta,
        sort_by: args.sort.into(),
    };

    let dataset = load_dataset(&args.dataset)?;
    let engine = QueryEngine::new(&dataset, &codec);
    let mut transformations = engine.transformations(&query);
    info!(found = transformations.len(), "Transformations listed.");
    if let Some(limit) = args.limit {
        transformations.truncate(limit);
    }

    if transformations.is_empty() {
        println!("No transformations found.");
        return Ok(());
    }
    print_table(&transformations);

    if let Some(path) = &args.export {
        let rows = export_transformations(&dataset, &transformations, BufWriter::new(File::create(path)?))?;
        println!("✓ {} example row(s) exported to: {}", rows, path.display());
    }
    Ok(())
}

fn print_table(transformations: &[Transformation]) {
    let field_names: Vec<&str> = transformations[0]
        .statistics
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    let mut header = format!("{:<40} {:>5} {:>8} {:>4} {:>7}", "Value", "Atoms", "Examples", "Sim", "Virtual");
    for name in &field_names {
        header.push_str(&format!(" {:>12}", format!("Δ{}", name)));
    }
    println!("{}", header);

    for t in transformations {
        let mut line = format!(
            "{:<40} {:>5} {:>8} {:>4} {:>7}",
            t.value2_id,
            t.value2_atoms,
            t.example_count(),
            t.max_similarity,
            if t.virtual_example().is_some() { "yes" } else { "" }
        );
        for statistics in &t.statistics {
            let all = statistics.at(0);
            line.push_str(&format!(" {:>12}", format_optional(all.and_then(|s| s.mean))));
        }
        println!("{}", line);
    }
}
