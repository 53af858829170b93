use super::error::EngineError;
use crate::core::canonical::Canonicalizer;
use crate::core::models::ids::FragmentIndex;
use crate::core::models::molecule::Molecule;
use std::collections::HashMap;
use std::sync::OnceLock;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Number of environment radii captured by a fragment fingerprint.
pub const FINGERPRINT_RADII: usize = 5;

/// Environment IDs of a fragment around its attachment points.
///
/// Entry `r - 1` is the canonical ID of the substructure spanned by all atoms
/// within `r` bonds of the R-group markers. Aromaticity is kept as a query
/// feature, implicit hydrogens are dropped and marker labels are made generic, so
/// two fragments share radius `r` exactly when their neighbourhoods look alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint([String; FINGERPRINT_RADII]);

impl Fingerprint {
    pub fn new(ids: [String; FINGERPRINT_RADII]) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }

    /// Number of leading radii on which two fingerprints agree (0 to 5).
    pub fn shared_radius(&self, other: &Fingerprint) -> u8 {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count() as u8
    }

    /// Computes the fingerprint of a fragment molecule.
    pub fn of(fragment: &Molecule, canonicalizer: &dyn Canonicalizer) -> Self {
        let roots: Vec<_> = fragment.markers().into_iter().map(|(id, _)| id).collect();
        let ids = std::array::from_fn(|i| {
            let sphere = fragment.sphere(&roots, i + 1);
            let (mut environment, _) = fragment.subgraph(&sphere);
            for id in environment.atom_ids() {
                if let Some(atom) = environment.atom_mut(id) {
                    atom.hydrogens = 0;
                    if atom.is_marker() {
                        atom.rgroup = Some(0);
                    }
                }
            }
            canonicalizer.canonicalize(&environment)
        });
        Self(ids)
    }
}

#[derive(Debug)]
struct Entry {
    id: String,
    heavy_atoms: usize,
    fingerprint: OnceLock<Fingerprint>,
}

/// Interns canonical fragment IDs into dense indices.
///
/// The first occurrence of a canonical ID fixes its index; indices are never
/// reused. Fingerprints are computed on first request and then cached.
#[derive(Debug, Default)]
pub struct FragmentDictionary {
    entries: Vec<Entry>,
    lookup: HashMap<String, FragmentIndex>,
}

impl FragmentDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `id`, inserting it if it is new.
    pub fn intern(&mut self, id: &str, heavy_atoms: usize) -> FragmentIndex {
        if let Some(&index) = self.lookup.get(id) {
            return index;
        }
        let index = self.entries.len();
        self.entries.push(Entry {
            id: id.to_string(),
            heavy_atoms,
            fingerprint: OnceLock::new(),
        });
        self.lookup.insert(id.to_string(), index);
        index
    }

    /// Canonicalizes and interns a fragment molecule.
    pub fn intern_molecule(
        &mut self,
        fragment: &Molecule,
        canonicalizer: &dyn Canonicalizer,
    ) -> FragmentIndex {
        let id = canonicalizer.canonicalize(fragment);
        self.intern(&id, fragment.heavy_atom_count())
    }

    /// Inserts a fragment read back from a persisted data set, with its stored
    /// fingerprint.
    pub fn insert_loaded(
        &mut self,
        id: &str,
        heavy_atoms: usize,
        fingerprint: Fingerprint,
    ) -> FragmentIndex {
        let index = self.intern(id, heavy_atoms);
        let _ = self.entries[index].fingerprint.set(fingerprint);
        index
    }

    pub fn index_of(&self, id: &str) -> Option<FragmentIndex> {
        self.lookup.get(id).copied()
    }

    pub fn id(&self, index: FragmentIndex) -> Option<&str> {
        self.entries.get(index).map(|e| e.id.as_str())
    }

    pub fn heavy_atoms(&self, index: FragmentIndex) -> Option<usize> {
        self.entries.get(index).map(|e| e.heavy_atoms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(index, canonical ID, heavy atoms)` in index order.
    pub fn iter(&self) -> impl Iterator<Item = (FragmentIndex, &str, usize)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.id.as_str(), e.heavy_atoms))
    }

    /// Returns the cached fingerprint, if it was loaded or computed before.
    pub fn cached_fingerprint(&self, index: FragmentIndex) -> Option<&Fingerprint> {
        self.entries.get(index).and_then(|e| e.fingerprint.get())
    }

    /// Returns the fingerprint of a fragment, computing it on first use.
    pub fn fingerprint(
        &self,
        index: FragmentIndex,
        canonicalizer: &dyn Canonicalizer,
    ) -> Result<&Fingerprint, EngineError> {
        let entry = self
            .entries
            .get(index)
            .ok_or(EngineError::UnknownFragment(index))?;
        if let Some(fingerprint) = entry.fingerprint.get() {
            return Ok(fingerprint);
        }
        let fragment = canonicalizer.parse(&entry.id)?;
        let computed = Fingerprint::of(&fragment, canonicalizer);
        Ok(entry.fingerprint.get_or_init(|| computed))
    }

    /// Computes every missing fingerprint.
    pub fn compute_fingerprints(&self, canonicalizer: &dyn Canonicalizer) -> Result<(), EngineError> {
        #[cfg(not(feature = "parallel"))]
        let indices = 0..self.entries.len();

        #[cfg(feature = "parallel")]
        let indices = (0..self.entries.len()).into_par_iter();

        indices.try_for_each(|i| self.fingerprint(i, canonicalizer).map(|_| ()))
    }
}
