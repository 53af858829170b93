use mmpairs::core::io::source::TableLayout;
use mmpairs::engine::config::BuildConfig;
use std::path::PathBuf;

pub struct AppConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub layout: TableLayout,
    pub core_config: BuildConfig,
}
