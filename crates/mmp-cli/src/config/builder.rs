use super::defaults::DefaultsConfig;
use super::file::FileConfig;
use super::models::AppConfig;
use crate::cli::BuildArgs;
use crate::error::{CliError, Result};
use mmpairs::core::io::source::TableLayout;
use mmpairs::engine::config as core_config;
use std::str::FromStr;

/// Resolves the build configuration.
///
/// Precedence, highest first: command-line flags, `-S key=value` settings, the
/// configuration file, built-in defaults.
pub fn build_config(args: &BuildArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let fragmentation = file_config.fragmentation.take().unwrap_or_default();
    let input = file_config.input.take().unwrap_or_default();

    let dataset_name = args
        .name
        .clone()
        .or(file_config.dataset_name.take())
        .or_else(|| {
            args.input
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        });

    let mut builder = core_config::BuildConfigBuilder::new()
        .keys_min_atoms(
            args.keys_min_atoms
                .or(fragmentation.keys_min_atoms)
                .unwrap_or(defaults.keys_min_atoms),
        )
        .max_value_atoms(args.max_value_atoms.or(fragmentation.max_value_atoms))
        .hydrogen_variants(
            !args.no_hydrogen_variants
                && fragmentation
                    .hydrogen_variants
                    .unwrap_or(defaults.hydrogen_variants),
        )
        .double_cuts(
            !args.no_double_cuts && fragmentation.double_cuts.unwrap_or(defaults.double_cuts),
        )
        .ui_configuration(file_config.ui_configuration.take().unwrap_or_default());
    if let Some(name) = dataset_name {
        builder = builder.dataset_name(name);
    }
    let core_config = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let layout = TableLayout {
        structure_column: args
            .structure_column
            .clone()
            .or(input.structure_column)
            .unwrap_or(defaults.structure_column),
        name_column: Some(
            args.name_column
                .clone()
                .or(input.name_column)
                .unwrap_or(defaults.name_column),
        ),
        coordinates_column: Some(input.coordinates_column.unwrap_or(defaults.coordinates_column)),
    };

    Ok(AppConfig {
        input_path: args.input.clone(),
        output_path: args.output.clone(),
        layout,
        core_config,
    })
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();

        match key {
            "dataset-name" => config.dataset_name = Some(value.to_string()),
            "fragmentation.keys-min-atoms" => {
                config
                    .fragmentation
                    .get_or_insert_with(Default::default)
                    .keys_min_atoms = Some(parse_value(key, value, "integer")?);
            }
            "fragmentation.max-value-atoms" => {
                config
                    .fragmentation
                    .get_or_insert_with(Default::default)
                    .max_value_atoms = Some(parse_value(key, value, "integer")?);
            }
            "fragmentation.hydrogen-variants" => {
                config
                    .fragmentation
                    .get_or_insert_with(Default::default)
                    .hydrogen_variants = Some(parse_value(key, value, "boolean")?);
            }
            "fragmentation.double-cuts" => {
                config
                    .fragmentation
                    .get_or_insert_with(Default::default)
                    .double_cuts = Some(parse_value(key, value, "boolean")?);
            }
            "input.structure-column" => {
                config.input.get_or_insert_with(Default::default).structure_column =
                    Some(value.to_string());
            }
            "input.name-column" => {
                config.input.get_or_insert_with(Default::default).name_column =
                    Some(value.to_string());
            }
            "input.coordinates-column" => {
                config.input.get_or_insert_with(Default::default).coordinates_column =
                    Some(value.to_string());
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn base_build_args() -> BuildArgs {
        BuildArgs {
            input: PathBuf::from("data/kinases.tsv"),
            output: PathBuf::from("kinases.mmp"),
            config: None,
            name: None,
            keys_min_atoms: None,
            max_value_atoms: None,
            no_hydrogen_variants: false,
            no_double_cuts: false,
            structure_column: None,
            name_column: None,
            set_values: vec![],
        }
    }

    fn write_config(toml: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mmp.toml");
        fs::write(&path, toml).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_and_input_stem_fill_the_gaps() {
        let app = build_config(&base_build_args()).unwrap();
        let cfg = app.core_config;
        let defaults = DefaultsConfig::default();

        assert_eq!(cfg.dataset_name, "kinases");
        assert_eq!(cfg.fragmentation.keys_min_atoms, defaults.keys_min_atoms);
        assert_eq!(cfg.fragmentation.max_value_atoms, None);
        assert!(cfg.fragmentation.hydrogen_variants);
        assert!(cfg.fragmentation.double_cuts);
        assert_eq!(app.layout, TableLayout::default());
    }

    #[test]
    fn file_values_are_merged() {
        let (_dir, path) = write_config(
            r#"
            dataset-name = "from-file"
            [fragmentation]
            keys-min-atoms = 6
            max-value-atoms = 10
            hydrogen-variants = false
            [input]
            structure-column = "Smiles"
            "#,
        );
        let mut args = base_build_args();
        args.config = Some(path);

        let app = build_config(&args).unwrap();
        assert_eq!(app.core_config.dataset_name, "from-file");
        assert_eq!(app.core_config.fragmentation.keys_min_atoms, 6);
        assert_eq!(app.core_config.fragmentation.max_value_atoms, Some(10));
        assert!(!app.core_config.fragmentation.hydrogen_variants);
        assert_eq!(app.layout.structure_column, "Smiles");
    }

    #[test]
    fn cli_beats_set_values_which_beat_the_file() {
        let (_dir, path) = write_config("[fragmentation]\nkeys-min-atoms = 6\nmax-value-atoms = 10\n");
        let mut args = base_build_args();
        args.config = Some(path);
        args.set_values = vec![
            "fragmentation.keys-min-atoms=7".to_string(),
            "fragmentation.max-value-atoms=12".to_string(),
            "input.name-column=Compound".to_string(),
        ];
        args.keys_min_atoms = Some(3);
        args.no_double_cuts = true;

        let app = build_config(&args).unwrap();
        assert_eq!(app.core_config.fragmentation.keys_min_atoms, 3);
        assert_eq!(app.core_config.fragmentation.max_value_atoms, Some(12));
        assert!(!app.core_config.fragmentation.double_cuts);
        assert_eq!(app.layout.name_column.as_deref(), Some("Compound"));
    }

    #[test]
    fn malformed_set_values_are_rejected() {
        let mut args = base_build_args();
        args.set_values = vec!["fragmentation.keys-min-atoms".to_string()];
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));

        args.set_values = vec!["fragmentation.double-cuts=maybe".to_string()];
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));

        args.set_values = vec!["sampling.rotamers=1".to_string()];
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));
    }

    #[test]
    fn invalid_core_values_surface_as_config_errors() {
        let mut args = base_build_args();
        args.keys_min_atoms = Some(0);
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));
    }
}
