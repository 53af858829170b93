use thiserror::Error;

/// Default minimum heavy-atom count of a key fragment.
pub const DEFAULT_KEYS_MIN_ATOMS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Knobs of the fragmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentationConfig {
    /// Minimum heavy-atom count for a fragment to act as a key.
    pub keys_min_atoms: usize,
    /// Optional upper bound on the heavy-atom count of value fragments.
    pub max_value_atoms: Option<usize>,
    /// Emit whole-molecule hydrogen-substitution records.
    pub hydrogen_variants: bool,
    /// Emit double-cut records.
    pub double_cuts: bool,
}

impl Default for FragmentationConfig {
    fn default() -> Self {
        Self {
            keys_min_atoms: DEFAULT_KEYS_MIN_ATOMS,
            max_value_atoms: None,
            hydrogen_variants: true,
            double_cuts: true,
        }
    }
}

impl FragmentationConfig {
    /// Whether a fragment of `atoms` heavy atoms may serve as a value.
    pub fn accepts_value(&self, atoms: usize) -> bool {
        self.max_value_atoms.is_none_or(|max| atoms <= max)
    }

    /// Whether a fragment of `atoms` heavy atoms may serve as a key.
    pub fn accepts_key(&self, atoms: usize) -> bool {
        atoms >= self.keys_min_atoms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    /// Data set name recorded in the file header.
    pub dataset_name: String,
    pub fragmentation: FragmentationConfig,
    /// Opaque UI configuration lines copied verbatim into the output.
    pub ui_configuration: Vec<String>,
}

#[derive(Default)]
pub struct BuildConfigBuilder {
    dataset_name: Option<String>,
    keys_min_atoms: Option<usize>,
    max_value_atoms: Option<usize>,
    hydrogen_variants: Option<bool>,
    double_cuts: Option<bool>,
    ui_configuration: Vec<String>,
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = Some(name.into());
        self
    }
    pub fn keys_min_atoms(mut self, atoms: usize) -> Self {
        self.keys_min_atoms = Some(atoms);
        self
    }
    pub fn max_value_atoms(mut self, atoms: Option<usize>) -> Self {
        self.max_value_atoms = atoms;
        self
    }
    pub fn hydrogen_variants(mut self, enabled: bool) -> Self {
        self.hydrogen_variants = Some(enabled);
        self
    }
    pub fn double_cuts(mut self, enabled: bool) -> Self {
        self.double_cuts = Some(enabled);
        self
    }
    pub fn ui_configuration(mut self, lines: Vec<String>) -> Self {
        self.ui_configuration = lines;
        self
    }

    pub fn build(self) -> Result<BuildConfig, ConfigError> {
        let dataset_name = self
            .dataset_name
            .ok_or(ConfigError::MissingParameter("dataset_name"))?;
        if dataset_name.trim().is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "dataset_name",
                reason: "must not be empty".to_string(),
            });
        }
        if dataset_name.contains(['\t', '\n', '\r', '"']) {
            return Err(ConfigError::InvalidParameter {
                name: "dataset_name",
                reason: "must not contain tabs, line breaks or quotes".to_string(),
            });
        }

        let defaults = FragmentationConfig::default();
        let keys_min_atoms = self.keys_min_atoms.unwrap_or(defaults.keys_min_atoms);
        if keys_min_atoms == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "keys_min_atoms",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(BuildConfig {
            dataset_name,
            fragmentation: FragmentationConfig {
                keys_min_atoms,
                max_value_atoms: self.max_value_atoms,
                hydrogen_variants: self.hydrogen_variants.unwrap_or(defaults.hydrogen_variants),
                double_cuts: self.double_cuts.unwrap_or(defaults.double_cuts),
            },
            ui_configuration: self.ui_configuration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_dataset_name() {
        let result = BuildConfigBuilder::new().build();
        assert_eq!(result, Err(ConfigError::MissingParameter("dataset_name")));
    }

    #[test]
    fn builder_applies_fragmentation_defaults() {
        let config = BuildConfigBuilder::new().dataset_name("kinases").build().unwrap();
        assert_eq!(config.dataset_name, "kinases");
        assert_eq!(config.fragmentation, FragmentationConfig::default());
        assert_eq!(config.fragmentation.keys_min_atoms, DEFAULT_KEYS_MIN_ATOMS);
        assert!(config.ui_configuration.is_empty());
    }

    #[test]
    fn builder_rejects_unusable_values() {
        let zero_keys = BuildConfigBuilder::new()
            .dataset_name("x")
            .keys_min_atoms(0)
            .build();
        assert!(matches!(
            zero_keys,
            Err(ConfigError::InvalidParameter { name: "keys_min_atoms", .. })
        ));

        let tabbed = BuildConfigBuilder::new().dataset_name("a\tb").build();
        assert!(matches!(
            tabbed,
            Err(ConfigError::InvalidParameter { name: "dataset_name", .. })
        ));
    }

    #[test]
    fn size_limits_gate_keys_and_values() {
        let config = FragmentationConfig {
            max_value_atoms: Some(3),
            ..FragmentationConfig::default()
        };
        assert!(config.accepts_key(4));
        assert!(!config.accepts_key(3));
        assert!(config.accepts_value(3));
        assert!(!config.accepts_value(4));
        assert!(FragmentationConfig::default().accepts_value(1000));
    }
}
