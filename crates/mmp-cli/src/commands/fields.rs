use super::{format_optional, load_dataset};
use crate::cli::FieldsArgs;
use crate::error::Result;

pub fn run(args: FieldsArgs) -> Result<()> {
    let dataset = load_dataset(&args.dataset)?;
    println!(
        "Data set '{}' ({} molecules, {} matched pairs)",
        dataset.name(),
        dataset.molecule_count(),
        dataset.pair_count()
    );
    println!("{:<24} {:<24} {:<8} {:>8} {:>8}", "Name", "Long name", "Type", "P5", "P95");
    for field in dataset.field_metadata() {
        println!(
            "{:<24} {:<24} {:<8} {:>8} {:>8}",
            field.info.name,
            field.info.long_name,
            field.info.category.as_str(),
            format_optional(field.percentile_5),
            format_optional(field.percentile_95)
        );
    }
    Ok(())
}
