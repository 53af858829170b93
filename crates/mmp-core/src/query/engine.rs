use super::dataset::DataSet;
use super::stats::FieldStatistics;
use super::virtual_molecule::graft;
use crate::core::canonical::Canonicalizer;
use crate::core::fields::FieldCategory;
use crate::core::models::ids::{FragmentIndex, MoleculeIndex};
use crate::engine::dictionary::Fingerprint;
use crate::engine::records::{CutType, KeySet};
use crate::store::format::MoleculeRow;
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Similarity of an example found under exactly the queried key set, and of
/// virtual examples.
pub const SEED_SIMILARITY: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SortBy {
    #[default]
    ExampleCount,
    Similarity,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" | "examples" | "example-count" => Ok(Self::ExampleCount),
            "similarity" => Ok(Self::Similarity),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// A transformation lookup: which values replace `value` on the given keys?
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationQuery {
    /// Canonical structure ID of the seed molecule the keys and value came from.
    pub molecule_id: String,
    /// Canonical IDs of the key fragments, in key-set order.
    pub keys: Vec<String>,
    /// Canonical ID of the value being replaced.
    pub value: String,
    /// Inclusive bounds on `size(value2) - size(value)`.
    pub min_delta: isize,
    pub max_delta: isize,
    pub sort_by: SortBy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExampleMolecule {
    Stored(MoleculeIndex),
    /// A structure that does not exist in the data set, by canonical ID.
    Virtual(String),
}

impl ExampleMolecule {
    pub fn index(&self) -> Option<MoleculeIndex> {
        match self {
            Self::Stored(index) => Some(*index),
            Self::Virtual(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationExample {
    pub molecule1: ExampleMolecule,
    pub molecule2: ExampleMolecule,
    pub keys: KeySet,
    /// Shared fingerprint radius with the queried keys (0-5), or 6 for the queried
    /// key set itself.
    pub similarity: u8,
}

impl TransformationExample {
    pub fn is_virtual(&self) -> bool {
        matches!(self.molecule2, ExampleMolecule::Virtual(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transformation {
    pub value1: FragmentIndex,
    pub value1_atoms: usize,
    pub value2: FragmentIndex,
    pub value2_atoms: usize,
    /// Canonical ID of the replacing value.
    pub value2_id: String,
    pub cut_type: CutType,
    pub examples: Vec<TransformationExample>,
    /// Highest similarity among the stored examples.
    pub max_similarity: u8,
    pub statistics: Vec<FieldStatistics>,
}

impl Transformation {
    /// Number of stored (non-virtual) examples.
    pub fn example_count(&self) -> usize {
        self.examples.iter().filter(|e| !e.is_virtual()).count()
    }

    pub fn virtual_example(&self) -> Option<&TransformationExample> {
        self.examples.iter().find(|e| e.is_virtual())
    }
}

/// Read-only query surface over a loaded [`DataSet`].
///
/// Absent keys or values are not errors; they produce empty results.
pub struct QueryEngine<'a> {
    dataset: &'a DataSet,
    canonicalizer: &'a dyn Canonicalizer,
}

impl<'a> QueryEngine<'a> {
    pub fn new(dataset: &'a DataSet, canonicalizer: &'a dyn Canonicalizer) -> Self {
        Self {
            dataset,
            canonicalizer,
        }
    }

    pub fn dataset(&self) -> &'a DataSet {
        self.dataset
    }

    /// Maps canonical key IDs onto a key set of this data set.
    pub fn resolve_keys<S: AsRef<str>>(&self, keys: &[S]) -> Option<KeySet> {
        let indices: Option<Vec<FragmentIndex>> = keys
            .iter()
            .map(|k| self.dataset.dictionary().index_of(k.as_ref()))
            .collect();
        KeySet::from_slice(&indices?)
    }

    fn space_of(&self, keys: &KeySet) -> Vec<MoleculeIndex> {
        let mut molecules: Vec<MoleculeIndex> = self
            .dataset
            .observations(keys)
            .iter()
            .map(|o| o.molecule)
            .collect();
        molecules.sort_unstable();
        molecules.dedup();
        molecules
    }

    /// Number of distinct molecules observed under a key set.
    pub fn chemical_space_size<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        self.resolve_keys(keys).map_or(0, |k| self.space_of(&k).len())
    }

    /// The molecule rows observed under a key set, by ascending molecule index.
    pub fn chemical_space<S: AsRef<str>>(&self, keys: &[S]) -> Vec<&'a MoleculeRow> {
        let Some(keys) = self.resolve_keys(keys) else {
            return Vec::new();
        };
        let dataset = self.dataset;
        self.space_of(&keys)
            .into_iter()
            .flat_map(|m| dataset.rows_of(m))
            .collect()
    }

    /// Lists the transformations of `query.value` on `query.keys`.
    ///
    /// Every result carries its stored examples scored by key similarity, a virtual
    /// example when grafting the new value onto the keys yields a structure absent
    /// from the data set, and per-field delta statistics.
    #[instrument(skip_all, name = "transformation_query", fields(value = %query.value))]
    pub fn transformations(&self, query: &TransformationQuery) -> Vec<Transformation> {
        let dictionary = self.dataset.dictionary();
        let (Some(keys), Some(value1)) = (
            self.resolve_keys(&query.keys),
            dictionary.index_of(&query.value),
        ) else {
            return Vec::new();
        };
        let Some(by_size) = self.dataset.pairs_from(value1) else {
            return Vec::new();
        };
        let value1_atoms = dictionary.heavy_atoms(value1).unwrap_or_default() as isize;
        let low = value1_atoms.saturating_add(query.min_delta).max(0);
        let high = value1_atoms.saturating_add(query.max_delta);
        if high < low {
            return Vec::new();
        }

        let query_fingerprints: Vec<Option<&Fingerprint>> = keys
            .keys()
            .into_iter()
            .map(|k| dictionary.fingerprint(k, self.canonicalizer).ok())
            .collect();
        let seed = match self.dataset.molecule_index(&query.molecule_id) {
            Some(index) => ExampleMolecule::Stored(index),
            None => ExampleMolecule::Virtual(query.molecule_id.clone()),
        };

        let mut results = Vec::new();
        for positions in by_size.range(low as usize..=high as usize).map(|(_, p)| p) {
            for pair in positions.iter().filter_map(|&p| self.dataset.pair(p)) {
                if pair.key.cut_type != keys.cut_type() {
                    continue;
                }
                let mut examples: Vec<TransformationExample> = self
                    .dataset
                    .resolve_examples(pair)
                    .into_iter()
                    .map(|e| TransformationExample {
                        molecule1: ExampleMolecule::Stored(e.molecule1),
                        molecule2: ExampleMolecule::Stored(e.molecule2),
                        keys: e.keys,
                        similarity: self.similarity(&keys, &query_fingerprints, &e.keys),
                    })
                    .collect();
                let max_similarity = examples.iter().map(|e| e.similarity).max().unwrap_or(0);
                let statistics = self.statistics(&examples);

                let value2_id = dictionary.id(pair.key.value2).unwrap_or_default().to_string();
                if let Some(product) = self.virtual_product(&query.keys, &value2_id) {
                    examples.push(TransformationExample {
                        molecule1: seed.clone(),
                        molecule2: ExampleMolecule::Virtual(product),
                        keys,
                        similarity: SEED_SIMILARITY,
                    });
                }

                results.push(Transformation {
                    value1,
                    value1_atoms: pair.key.value1_atoms,
                    value2: pair.key.value2,
                    value2_atoms: pair.key.value2_atoms,
                    value2_id,
                    cut_type: pair.key.cut_type,
                    examples,
                    max_similarity,
                    statistics,
                });
            }
        }

        match query.sort_by {
            SortBy::ExampleCount => results.sort_by(|a, b| {
                b.example_count()
                    .cmp(&a.example_count())
                    .then(a.value2.cmp(&b.value2))
            }),
            SortBy::Similarity => results.sort_by(|a, b| {
                b.max_similarity
                    .cmp(&a.max_similarity)
                    .then(b.example_count().cmp(&a.example_count()))
                    .then(a.value2.cmp(&b.value2))
            }),
        }
        debug!(transformations = results.len(), "Transformation query answered.");
        results
    }

    fn similarity(
        &self,
        query_keys: &KeySet,
        query_fingerprints: &[Option<&Fingerprint>],
        example_keys: &KeySet,
    ) -> u8 {
        if example_keys == query_keys {
            return SEED_SIMILARITY;
        }
        let dictionary = self.dataset.dictionary();
        example_keys
            .keys()
            .into_iter()
            .zip(query_fingerprints)
            .map(|(key, query_fp)| {
                match (query_fp, dictionary.fingerprint(key, self.canonicalizer)) {
                    (Some(query_fp), Ok(example_fp)) => query_fp.shared_radius(example_fp),
                    _ => 0,
                }
            })
            .min()
            .unwrap_or(0)
    }

    /// Canonical ID of the grafted product if it is not part of the data set.
    fn virtual_product(&self, keys: &[String], value2_id: &str) -> Option<String> {
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let product = graft(self.canonicalizer, &key_refs, value2_id).ok()??;
        let id = self.canonicalizer.canonicalize(&product);
        self.dataset.molecule_index(&id).is_none().then_some(id)
    }

    fn statistics(&self, examples: &[TransformationExample]) -> Vec<FieldStatistics> {
        self.dataset
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| field.category == FieldCategory::Numeric)
            .map(|(i, field)| {
                let observations: Vec<(u8, f64)> = examples
                    .iter()
                    .filter_map(|e| {
                        let v1 = self.dataset.molecule_value(e.molecule1.index()?, i)?;
                        let v2 = self.dataset.molecule_value(e.molecule2.index()?, i)?;
                        Some((e.similarity, v2 - v1))
                    })
                    .collect();
                FieldStatistics::compute(i, &field.name, &observations)
            })
            .collect()
    }
}
