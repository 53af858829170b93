use super::records::{FragmentationRecord, KeySet};
use crate::core::models::ids::{FragmentIndex, MoleculeIndex};
use std::collections::HashMap;

/// A value fragment observed on a molecule under some key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Observation {
    pub value: FragmentIndex,
    pub molecule: MoleculeIndex,
}

pub type SizeBucket = HashMap<KeySet, Vec<Observation>>;

/// Fragmentation records bucketed by value size and key set.
///
/// Bucket `n` holds every record whose value has `n` heavy atoms; within a bucket,
/// observations for a key set keep their insertion order.
#[derive(Debug, Default)]
pub struct PairIndex {
    buckets: Vec<SizeBucket>,
    len: usize,
}

impl PairIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(&mut self, value_atoms: usize) -> &mut SizeBucket {
        if self.buckets.len() <= value_atoms {
            self.buckets.resize_with(value_atoms + 1, HashMap::new);
        }
        &mut self.buckets[value_atoms]
    }

    /// Appends an observation for `keys` to the bucket of size `value_atoms`.
    pub fn insert(&mut self, keys: KeySet, value_atoms: usize, observation: Observation) {
        self.bucket_mut(value_atoms)
            .entry(keys)
            .or_default()
            .push(observation);
        self.len += 1;
    }

    /// Appends a hydrogen-substitution observation unless the key set's most
    /// recent entry already carries the same value.
    ///
    /// # Return
    ///
    /// `true` if the observation was stored.
    pub fn insert_hydrogen(&mut self, keys: KeySet, value_atoms: usize, observation: Observation) -> bool {
        let entries = self.bucket_mut(value_atoms).entry(keys).or_default();
        if entries.last().is_some_and(|last| last.value == observation.value) {
            return false;
        }
        entries.push(observation);
        self.len += 1;
        true
    }

    /// Routes a fragmentation record to [`insert`](Self::insert) or
    /// [`insert_hydrogen`](Self::insert_hydrogen).
    pub fn insert_record(&mut self, record: &FragmentationRecord) -> bool {
        let observation = Observation {
            value: record.value,
            molecule: record.molecule,
        };
        if record.hydrogen_variant {
            self.insert_hydrogen(record.keys, record.value_atoms, observation)
        } else {
            self.insert(record.keys, record.value_atoms, observation);
            true
        }
    }

    pub fn bucket(&self, value_atoms: usize) -> Option<&SizeBucket> {
        self.buckets.get(value_atoms)
    }

    /// Largest value size seen, or `None` for an empty index.
    pub fn max_value_atoms(&self) -> Option<usize> {
        self.buckets.len().checked_sub(1)
    }

    /// All observations for a key set across every size bucket, smallest values
    /// first.
    pub fn lookup(&self, keys: &KeySet) -> Vec<Observation> {
        self.buckets
            .iter()
            .filter_map(|bucket| bucket.get(keys))
            .flatten()
            .copied()
            .collect()
    }

    /// Number of distinct molecules that carry the key set.
    pub fn chemical_space_size(&self, keys: &KeySet) -> usize {
        let mut molecules: Vec<MoleculeIndex> =
            self.lookup(keys).into_iter().map(|o| o.molecule).collect();
        molecules.sort_unstable();
        molecules.dedup();
        molecules.len()
    }

    /// Total number of stored observations.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
