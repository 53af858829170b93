use clap::{Args, Parser, Subcommand, ValueEnum};
use mmpairs::query::engine::SortBy;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan",
    version,
    about = "mmp - Build and query matched molecular pair data sets.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for pair enumeration.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fragment a molecule table and write a matched molecular pair data set.
    Build(BuildArgs),
    /// Show the molecules that share a key (one key, or two for a double cut).
    Space(SpaceArgs),
    /// List the transformations of a value on a set of keys.
    Transform(TransformArgs),
    /// Describe the data fields of a data set.
    Fields(FieldsArgs),
}

/// Arguments for the `build` subcommand.
#[derive(Args, Debug)]
pub struct BuildArgs {
    // --- Core Arguments ---
    /// Path to the tab-delimited input table.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the data set file to write.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Path to an optional configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Name of the data set (defaults to the input file stem).
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    // --- Fragmentation Overrides ---
    /// Minimum heavy-atom count of a key fragment.
    #[arg(short = 'k', long, value_name = "INT")]
    pub keys_min_atoms: Option<usize>,

    /// Maximum heavy-atom count of a value fragment.
    #[arg(long, value_name = "INT")]
    pub max_value_atoms: Option<usize>,

    /// Do not emit hydrogen-substitution records.
    #[arg(long)]
    pub no_hydrogen_variants: bool,

    /// Do not emit double-cut records.
    #[arg(long)]
    pub no_double_cuts: bool,

    // --- Input Layout Overrides ---
    /// Column holding the structure code.
    #[arg(long, value_name = "COLUMN")]
    pub structure_column: Option<String>,

    /// Column holding the molecule name.
    #[arg(long, value_name = "COLUMN")]
    pub name_column: Option<String>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S fragmentation.keys-min-atoms=5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `space` subcommand.
#[derive(Args, Debug)]
pub struct SpaceArgs {
    /// Path to a built data set.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub dataset: PathBuf,

    /// Key fragment structure codes, in key order.
    #[arg(short, long = "key", required = true, num_args(1..=2), value_name = "CODE")]
    pub keys: Vec<String>,

    /// Only print the number of molecules.
    #[arg(long)]
    pub count: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    /// Most examples first.
    Count,
    /// Most similar examples first.
    Similarity,
}

impl From<SortArg> for SortBy {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Count => SortBy::ExampleCount,
            SortArg::Similarity => SortBy::Similarity,
        }
    }
}

/// Arguments for the `transform` subcommand.
#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Path to a built data set.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub dataset: PathBuf,

    /// Structure code of the seed molecule.
    #[arg(short, long, required = true, value_name = "CODE")]
    pub molecule: String,

    /// Key fragment structure codes, in key order.
    #[arg(short, long = "key", required = true, num_args(1..=2), value_name = "CODE")]
    pub keys: Vec<String>,

    /// Structure code of the value to replace.
    #[arg(long, required = true, value_name = "CODE")]
    pub value: String,

    /// Lowest allowed change in value heavy-atom count.
    #[arg(long, default_value_t = -2, allow_negative_numbers = true, value_name = "INT")]
    pub min_delta: isize,

    /// Highest allowed change in value heavy-atom count.
    #[arg(long, default_value_t = 2, allow_negative_numbers = true, value_name = "INT")]
    pub max_delta: isize,

    /// Result order.
    #[arg(long, value_enum, default_value_t = SortArg::Count)]
    pub sort: SortArg,

    /// Print at most this many transformations.
    #[arg(short, long, value_name = "INT")]
    pub limit: Option<usize>,

    /// Also write the examples as a DataWarrior-style table.
    #[arg(short, long, value_name = "PATH")]
    pub export: Option<PathBuf>,
}

/// Arguments for the `fields` subcommand.
#[derive(Args, Debug)]
pub struct FieldsArgs {
    /// Path to a built data set.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub dataset: PathBuf,
}
