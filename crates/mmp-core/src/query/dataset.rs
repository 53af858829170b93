use crate::core::fields::{FieldCategory, FieldInfo, percentile};
use crate::core::models::ids::{FragmentIndex, MoleculeIndex};
use crate::engine::dictionary::FragmentDictionary;
use crate::engine::pair_index::Observation;
use crate::engine::records::{FragmentationRecord, KeySet, PairExample};
use crate::store::error::StoreError;
use crate::store::format::{FileHeader, MoleculeRow, PairRow, RowCounts};
use crate::store::reader::{LoadedTables, read_tables, read_tables_from_path};
use crate::store::writer::DataSetWriter;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::warn;

/// Descriptive metadata of one field of a data set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMetadata {
    pub info: FieldInfo,
    /// 5th percentile of the exact numeric values (numeric fields only).
    pub percentile_5: Option<f64>,
    /// 95th percentile of the exact numeric values (numeric fields only).
    pub percentile_95: Option<f64>,
}

/// A loaded, read-only data set with all lookup indices rebuilt.
#[derive(Debug)]
pub struct DataSet {
    header: FileHeader,
    ui_configuration: Vec<String>,
    molecules: Vec<MoleculeRow>,
    groups: Vec<Vec<usize>>,
    by_id: HashMap<String, MoleculeIndex>,
    dictionary: FragmentDictionary,
    fragments: Vec<FragmentationRecord>,
    key_index: HashMap<KeySet, Vec<Observation>>,
    back_index: HashMap<(FragmentIndex, MoleculeIndex), Vec<KeySet>>,
    pairs: Vec<PairRow>,
    mmp_index: HashMap<FragmentIndex, BTreeMap<usize, Vec<usize>>>,
    field_metadata: Vec<FieldMetadata>,
}

impl DataSet {
    pub fn read<R: BufRead>(input: R) -> Result<Self, StoreError> {
        Ok(Self::from_tables(read_tables(input)?))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self::from_tables(read_tables_from_path(path)?))
    }

    pub fn from_tables(tables: LoadedTables) -> Self {
        let molecule_count = tables.molecule_count();
        let mut groups = vec![Vec::new(); molecule_count];
        let mut by_id = HashMap::new();
        for (position, row) in tables.molecules.iter().enumerate() {
            groups[row.index].push(position);
            by_id.entry(row.id_code.clone()).or_insert(row.index);
        }

        let mut key_index: HashMap<KeySet, Vec<Observation>> = HashMap::new();
        let mut back_index: HashMap<(FragmentIndex, MoleculeIndex), Vec<KeySet>> = HashMap::new();
        for record in &tables.fragments {
            key_index.entry(record.keys).or_default().push(Observation {
                value: record.value,
                molecule: record.molecule,
            });
            back_index
                .entry((record.value, record.molecule))
                .or_default()
                .push(record.keys);
        }
        for keys in back_index.values_mut() {
            keys.sort_unstable();
            keys.dedup();
        }

        let mut mmp_index: HashMap<FragmentIndex, BTreeMap<usize, Vec<usize>>> = HashMap::new();
        for (position, pair) in tables.pairs.iter().enumerate() {
            mmp_index
                .entry(pair.key.value1)
                .or_default()
                .entry(pair.key.value2_atoms)
                .or_default()
                .push(position);
        }

        let field_metadata = field_metadata(&tables.header.fields, &tables.molecules);

        Self {
            header: tables.header,
            ui_configuration: tables.ui_configuration,
            molecules: tables.molecules,
            groups,
            by_id,
            dictionary: tables.dictionary,
            fragments: tables.fragments,
            key_index,
            back_index,
            pairs: tables.pairs,
            mmp_index,
            field_metadata,
        }
    }

    /// Serializes the data set again, keeping its original creation timestamp.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<RowCounts, StoreError> {
        let mut writer = DataSetWriter::new(
            &self.header.dataset_name,
            self.header.keys_min_atoms,
            self.header.fields.clone(),
        )?
        .with_created(self.header.created)
        .with_ui_configuration(self.ui_configuration.clone());
        for record in &self.fragments {
            writer.add_fragment(record)?;
        }
        for pair in &self.pairs {
            writer.add_pair(&pair.key, pair.examples.iter().copied())?;
        }
        writer.finish(&self.molecules, &self.dictionary, out)
    }

    pub fn name(&self) -> &str {
        &self.header.dataset_name
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn dictionary(&self) -> &FragmentDictionary {
        &self.dictionary
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.header.fields
    }

    pub fn field_metadata(&self) -> &[FieldMetadata] {
        &self.field_metadata
    }

    pub fn molecule_rows(&self) -> &[MoleculeRow] {
        &self.molecules
    }

    /// Number of distinct structures.
    pub fn molecule_count(&self) -> usize {
        self.groups.len()
    }

    /// All input rows that share the structure of a molecule index.
    pub fn rows_of(&self, molecule: MoleculeIndex) -> impl Iterator<Item = &MoleculeRow> {
        self.groups
            .get(molecule)
            .into_iter()
            .flatten()
            .map(|&position| &self.molecules[position])
    }

    /// Finds the molecule index of a canonical structure ID.
    pub fn molecule_index(&self, id_code: &str) -> Option<MoleculeIndex> {
        self.by_id.get(id_code).copied()
    }

    /// The canonical structure ID of a molecule index.
    pub fn id_code(&self, molecule: MoleculeIndex) -> Option<&str> {
        self.rows_of(molecule).next().map(|row| row.id_code.as_str())
    }

    /// Mean of the exact values of `field` across all rows of a molecule.
    pub fn molecule_value(&self, molecule: MoleculeIndex, field: usize) -> Option<f64> {
        let values: Vec<f64> = self
            .rows_of(molecule)
            .filter_map(|row| row.values.get(field).and_then(|v| v.exact()))
            .collect();
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn observations(&self, keys: &KeySet) -> &[Observation] {
        self.key_index
            .get(keys)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Pairs starting at `value1`, grouped by the heavy-atom count of the second value.
    pub fn pairs_from(&self, value1: FragmentIndex) -> Option<&BTreeMap<usize, Vec<usize>>> {
        self.mmp_index.get(&value1)
    }

    pub fn pair(&self, position: usize) -> Option<&PairRow> {
        self.pairs.get(position)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Recovers the key set of every stored example of a pair.
    ///
    /// An example `(m1, m2)` was produced under a key set `K` with both `(K, value1,
    /// m1)` and `(K, value2, m2)` among the fragment records. When the same molecule
    /// pair occurs several times, the candidates are handed out in ascending order,
    /// which is the order in which enumeration emitted them.
    pub fn resolve_examples(&self, pair: &PairRow) -> Vec<PairExample> {
        let mut used: HashMap<(MoleculeIndex, MoleculeIndex), usize> = HashMap::new();
        let mut examples = Vec::with_capacity(pair.examples.len());
        for &(m1, m2) in &pair.examples {
            let first = self.back_index.get(&(pair.key.value1, m1));
            let second = self.back_index.get(&(pair.key.value2, m2));
            let candidates: Vec<KeySet> = match (first, second) {
                (Some(first), Some(second)) => first
                    .iter()
                    .filter(|k| k.cut_type() == pair.key.cut_type && second.binary_search(*k).is_ok())
                    .copied()
                    .collect(),
                _ => Vec::new(),
            };
            let occurrence = used.entry((m1, m2)).or_default();
            let Some(&keys) = candidates.get(*occurrence).or(candidates.last()) else {
                warn!(
                    value1 = pair.key.value1,
                    value2 = pair.key.value2,
                    molecule1 = m1,
                    molecule2 = m2,
                    "No key set explains a stored example; skipping it."
                );
                continue;
            };
            *occurrence += 1;
            examples.push(PairExample {
                molecule1: m1,
                molecule2: m2,
                keys,
            });
        }
        examples
    }
}

fn field_metadata(fields: &[FieldInfo], molecules: &[MoleculeRow]) -> Vec<FieldMetadata> {
    fields
        .iter()
        .enumerate()
        .map(|(i, info)| {
            let (percentile_5, percentile_95) = if info.category == FieldCategory::Numeric {
                let mut values: Vec<f64> = molecules
                    .iter()
                    .filter_map(|row| row.values.get(i).and_then(|v| v.exact()))
                    .collect();
                values.sort_by(f64::total_cmp);
                (percentile(&values, 0.05), percentile(&values, 0.95))
            } else {
                (None, None)
            };
            FieldMetadata {
                info: info.clone(),
                percentile_5,
                percentile_95,
            }
        })
        .collect()
}
