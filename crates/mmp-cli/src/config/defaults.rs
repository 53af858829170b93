use mmpairs::engine::config::DEFAULT_KEYS_MIN_ATOMS;

pub struct DefaultsConfig {
    pub keys_min_atoms: usize,
    pub hydrogen_variants: bool,
    pub double_cuts: bool,
    pub structure_column: String,
    pub name_column: String,
    pub coordinates_column: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            keys_min_atoms: DEFAULT_KEYS_MIN_ATOMS,
            hydrogen_variants: true,
            double_cuts: true,
            structure_column: "Structure".to_string(),
            name_column: "Name".to_string(),
            coordinates_column: "Coordinates".to_string(),
        }
    }
}
