use crate::cli::BuildArgs;
use crate::config::builder::build_config;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use mmpairs::{
    core::canonical::GraphCodec,
    core::io::source::TableSource,
    engine::progress::ProgressReporter,
    workflows,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::{info, warn};

pub fn run(args: BuildArgs) -> Result<()> {
    info!("Resolving build configuration...");
    let app = build_config(&args)?;
    let codec = GraphCodec::new();

    info!(path = %app.input_path.display(), "Opening input table.");
    let source = TableSource::from_path(&app.input_path, &app.layout, &codec)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Building data set '{}' from {}...",
        app.core_config.dataset_name,
        app.input_path.display()
    );
    let mut out = BufWriter::new(File::create(&app.output_path)?);
    let result: Result<_> = workflows::build::run(source, &app.core_config, &codec, &reporter, &mut out)
        .map_err(CliError::from)
        .and_then(|summary| {
            out.flush()?;
            Ok(summary)
        });

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            drop(out);
            if std::fs::remove_file(&app.output_path).is_err() {
                warn!(path = %app.output_path.display(), "Could not remove incomplete output.");
            }
            return Err(e);
        }
    };

    if summary.skipped > 0 {
        println!("Skipped {} malformed record(s).", summary.skipped);
    }
    println!(
        "✓ {} molecules ({} rows), {} unique fragments, {} fragment rows, {} matched pairs written to: {}",
        summary.molecules,
        summary.rows,
        summary.unique_fragments,
        summary.fragment_rows,
        summary.pairs,
        app.output_path.display()
    );
    Ok(())
}
