use super::config::FragmentationConfig;
use super::dictionary::FragmentDictionary;
use super::records::{FragmentationRecord, KeySet};
use crate::core::canonical::Canonicalizer;
use crate::core::models::atom::Atom;
use crate::core::models::ids::{AtomId, FragmentIndex, MoleculeIndex};
use crate::core::models::molecule::Molecule;
use crate::core::models::topology::BondOrder;
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use tracing::{instrument, trace};

/// Returns the value fragment `H-R1` that stands for an unsubstituted position.
pub fn hydrogen_fragment() -> Molecule {
    let mut fragment = Molecule::new();
    let h = fragment.add_atom(Atom::new("H"));
    let marker = fragment.add_atom(Atom::marker(1));
    fragment.add_bond(h, marker, BondOrder::Single);
    fragment
}

/// Key/value records produced for one molecule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentationResult {
    pub records: Vec<FragmentationRecord>,
}

/// One connected piece left after removing the cut bonds, with R-group markers
/// at the former bond ends.
struct Piece {
    molecule: Molecule,
    origin: Vec<AtomId>,
    heavy_atoms: usize,
}

impl Piece {
    fn contains(&self, atom: AtomId) -> bool {
        self.origin.contains(&atom)
    }

    fn labels(&self) -> Vec<u8> {
        let mut labels: Vec<u8> = self.molecule.markers().into_iter().map(|m| m.1).collect();
        labels.sort_unstable();
        labels
    }
}

/// Removes the given `(bond, marker label)` cuts and caps both ends of every cut
/// bond with a marker of that label.
fn cut(molecule: &Molecule, cuts: &[(usize, u8)]) -> Vec<Piece> {
    let masked: Vec<usize> = cuts.iter().map(|c| c.0).collect();
    molecule
        .components_without(&masked)
        .into_iter()
        .map(|component| {
            let (mut piece, mapping) = molecule.subgraph(&component);
            for &(bond_idx, label) in cuts {
                let Some(bond) = molecule.bond(bond_idx) else {
                    continue;
                };
                for end in [bond.atom1_id, bond.atom2_id] {
                    if let Some(&local) = mapping.get(end) {
                        let marker = piece.add_atom(Atom::marker(label));
                        piece.add_bond(local, marker, bond.order);
                    }
                }
            }
            let heavy_atoms = piece.heavy_atom_count();
            Piece {
                molecule: piece,
                origin: component,
                heavy_atoms,
            }
        })
        .collect()
}

fn swap_marker_labels(molecule: &mut Molecule) {
    for (id, label) in molecule.markers() {
        if let Some(atom) = molecule.atom_mut(id) {
            atom.rgroup = Some(match label {
                1 => 2,
                2 => 1,
                other => other,
            });
        }
    }
}

fn generic_markers(molecule: &Molecule) -> Molecule {
    let mut generic = molecule.clone();
    for (id, _) in molecule.markers() {
        if let Some(atom) = generic.atom_mut(id) {
            atom.rgroup = Some(0);
        }
    }
    generic
}

/// Accumulates the records of one molecule, dropping exact duplicates that arise
/// from symmetric cuts.
struct Collector {
    molecule: MoleculeIndex,
    records: Vec<FragmentationRecord>,
    seen: HashSet<(KeySet, FragmentIndex)>,
}

impl Collector {
    fn new(molecule: MoleculeIndex) -> Self {
        Self {
            molecule,
            records: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn push(&mut self, keys: KeySet, value: FragmentIndex, value_atoms: usize, hydrogen_variant: bool) {
        if self.seen.insert((keys, value)) {
            self.records.push(FragmentationRecord {
                molecule: self.molecule,
                keys,
                value,
                value_atoms,
                hydrogen_variant,
            });
        }
    }

    fn finish(self) -> FragmentationResult {
        FragmentationResult {
            records: self.records,
        }
    }
}

/// Cuts molecules at rotatable bonds into key/value records.
///
/// Every rotatable bond yields a single cut in both directions, every pair of
/// rotatable bonds a double cut whose middle piece is the value, and every
/// distinct hydrogen position a whole-molecule record with the `H-R1` value.
pub struct Fragmenter<'a> {
    canonicalizer: &'a dyn Canonicalizer,
    config: &'a FragmentationConfig,
}

impl<'a> Fragmenter<'a> {
    pub fn new(canonicalizer: &'a dyn Canonicalizer, config: &'a FragmentationConfig) -> Self {
        Self {
            canonicalizer,
            config,
        }
    }

    /// Fragments one molecule, interning every emitted fragment into `dictionary`.
    ///
    /// # Arguments
    ///
    /// * `index` - Index of the molecule in the data set.
    /// * `molecule` - The structure; explicit hydrogens are folded away first.
    /// * `dictionary` - Fragment dictionary shared across the data set.
    ///
    /// # Return
    ///
    /// The key/value records of the molecule. Molecules
    /// without rotatable bonds still get their hydrogen-substitution records.
    #[instrument(level = "trace", skip_all, fields(molecule = index))]
    pub fn fragment(
        &self,
        index: MoleculeIndex,
        molecule: &Molecule,
        dictionary: &mut FragmentDictionary,
    ) -> FragmentationResult {
        let molecule = molecule.strip_hydrogens();
        let mut collector = Collector::new(index);
        let rotatable = molecule.rotatable_bonds();

        for &bond in &rotatable {
            self.single_cut(&molecule, bond, dictionary, &mut collector);
        }
        if self.config.double_cuts {
            for (&b1, &b2) in rotatable.iter().tuple_combinations() {
                self.double_cut(&molecule, b1, b2, dictionary, &mut collector);
            }
        }
        if self.config.hydrogen_variants {
            self.hydrogen_variants(&molecule, dictionary, &mut collector);
        }

        trace!(
            rotatable_bonds = rotatable.len(),
            records = collector.records.len(),
            "Molecule fragmented."
        );
        collector.finish()
    }

    fn single_cut(
        &self,
        molecule: &Molecule,
        bond_idx: usize,
        dictionary: &mut FragmentDictionary,
        collector: &mut Collector,
    ) {
        let Some(bond) = molecule.bond(bond_idx) else {
            return;
        };
        let pieces = cut(molecule, &[(bond_idx, 1)]);
        let [a, b] = pieces.as_slice() else {
            return;
        };
        let (key, value) = if a.contains(bond.atom1_id) { (a, b) } else { (b, a) };

        self.emit_single(key, value, dictionary, collector);
        self.emit_single(value, key, dictionary, collector);
    }

    fn emit_single(
        &self,
        key: &Piece,
        value: &Piece,
        dictionary: &mut FragmentDictionary,
        collector: &mut Collector,
    ) {
        if !self.config.accepts_key(key.heavy_atoms) || !self.config.accepts_value(value.heavy_atoms) {
            return;
        }
        let key_idx = dictionary.intern_molecule(&key.molecule, self.canonicalizer);
        let value_idx = dictionary.intern_molecule(&value.molecule, self.canonicalizer);
        collector.push(KeySet::single(key_idx), value_idx, value.heavy_atoms, false);
    }

    fn double_cut(
        &self,
        molecule: &Molecule,
        bond1: usize,
        bond2: usize,
        dictionary: &mut FragmentDictionary,
        collector: &mut Collector,
    ) {
        let pieces = cut(molecule, &[(bond1, 1), (bond2, 2)]);
        if pieces.len() != 3 {
            return;
        }
        let find = |labels: &[u8]| pieces.iter().find(|p| p.labels() == labels);
        let (Some(outer1), Some(middle), Some(outer2)) = (find(&[1]), find(&[1, 2]), find(&[2])) else {
            return;
        };

        if !self.config.accepts_key(outer1.heavy_atoms)
            || !self.config.accepts_key(outer2.heavy_atoms)
            || !self.config.accepts_value(middle.heavy_atoms)
        {
            return;
        }

        let mut value = middle.molecule.clone();
        let (first, second) = if self.keys_swapped(middle, outer1, outer2) {
            swap_marker_labels(&mut value);
            let mut first = outer2.molecule.clone();
            let mut second = outer1.molecule.clone();
            swap_marker_labels(&mut first);
            swap_marker_labels(&mut second);
            (first, second)
        } else {
            (outer1.molecule.clone(), outer2.molecule.clone())
        };

        let keys = KeySet::double(
            dictionary.intern_molecule(&first, self.canonicalizer),
            dictionary.intern_molecule(&second, self.canonicalizer),
        );
        let value_idx = dictionary.intern_molecule(&value, self.canonicalizer);
        collector.push(keys, value_idx, middle.heavy_atoms, false);
    }

    /// Decides whether the key attached to marker 2 must come first.
    ///
    /// Keys are ordered by the canonical rank of their attachment point in the
    /// value with marker labels erased; equal ranks fall back to the label-free
    /// IDs of the keys. Neither criterion depends on the order in which the bonds
    /// were visited.
    fn keys_swapped(&self, middle: &Piece, outer1: &Piece, outer2: &Piece) -> bool {
        let generic = generic_markers(&middle.molecule);
        let ranks = self.canonicalizer.canonical_ranks(&generic);
        let markers = middle.molecule.markers();
        let rank_of = |label: u8| {
            markers
                .iter()
                .find(|m| m.1 == label)
                .and_then(|m| ranks.get(m.0).copied())
        };

        match rank_of(1).cmp(&rank_of(2)) {
            Ordering::Less => false,
            Ordering::Greater => true,
            Ordering::Equal => {
                let id1 = self.canonicalizer.canonicalize(&generic_markers(&outer1.molecule));
                let id2 = self.canonicalizer.canonicalize(&generic_markers(&outer2.molecule));
                id1 > id2
            }
        }
    }

    fn hydrogen_variants(
        &self,
        molecule: &Molecule,
        dictionary: &mut FragmentDictionary,
        collector: &mut Collector,
    ) {
        let heavy_atoms = molecule.heavy_atom_count();
        if !self.config.accepts_key(heavy_atoms) {
            return;
        }

        let mut variants = BTreeSet::new();
        for (id, atom) in molecule.atoms_iter() {
            if !atom.is_heavy() || atom.hydrogens == 0 {
                continue;
            }
            let mut variant = molecule.clone();
            if let Some(host) = variant.atom_mut(id) {
                host.hydrogens -= 1;
            }
            let marker = variant.add_atom(Atom::marker(1));
            variant.add_bond(id, marker, BondOrder::Single);
            variants.insert(self.canonicalizer.canonicalize(&variant));
        }
        if variants.is_empty() {
            return;
        }

        let hydrogen = dictionary.intern_molecule(&hydrogen_fragment(), self.canonicalizer);
        for variant in variants {
            let key = dictionary.intern(&variant, heavy_atoms);
            collector.push(KeySet::single(key), hydrogen, 0, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canonical::GraphCodec;

    const RING: &str = "0:1.1:2.2:3.3:4.4:5.5:0";

    fn parse(code: &str) -> Molecule {
        GraphCodec::new().parse(code).unwrap()
    }

    fn toluene() -> Molecule {
        parse(&format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH3|{}.0-6", RING))
    }

    fn ethylbenzene() -> Molecule {
        parse(&format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH2.CH3|{}.0-6.6-7", RING))
    }

    fn chlorobenzene() -> Molecule {
        parse(&format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.Cl|{}.0-6", RING))
    }

    fn run(config: &FragmentationConfig, dict: &mut FragmentDictionary, mol: &Molecule) -> FragmentationResult {
        let codec = GraphCodec::new();
        Fragmenter::new(&codec, config).fragment(0, mol, dict)
    }

    fn cut_records(result: &FragmentationResult) -> Vec<FragmentationRecord> {
        result
            .records
            .iter()
            .filter(|r| !r.hydrogen_variant)
            .copied()
            .collect()
    }

    #[test]
    fn substituted_benzenes_share_the_phenyl_key() {
        let config = FragmentationConfig::default();
        let mut dict = FragmentDictionary::new();

        let tol = run(&config, &mut dict, &toluene());
        let eth = run(&config, &mut dict, &ethylbenzene());
        let chl = run(&config, &mut dict, &chlorobenzene());

        let phenyl_key = |result: &FragmentationResult| {
            cut_records(result)
                .into_iter()
                .find(|r| dict.heavy_atoms(r.keys.first()) == Some(6))
                .unwrap()
        };
        let (t, e, c) = (phenyl_key(&tol), phenyl_key(&eth), phenyl_key(&chl));
        assert_eq!(t.keys, e.keys);
        assert_eq!(t.keys, c.keys);
        assert_eq!((t.value_atoms, e.value_atoms, c.value_atoms), (1, 2, 1));
        assert_ne!(t.value, c.value);
    }

    #[test]
    fn small_side_is_never_a_key() {
        let config = FragmentationConfig::default();
        let mut dict = FragmentDictionary::new();
        let result = run(&config, &mut dict, &toluene());

        let cuts = cut_records(&result);
        assert_eq!(cuts.len(), 1);
        assert_eq!(dict.heavy_atoms(cuts[0].keys.first()), Some(6));
        assert_eq!(dict.heavy_atoms(cuts[0].value), Some(1));
    }

    #[test]
    fn discarded_double_cut_pieces_are_not_interned() {
        let config = FragmentationConfig::default();
        let mut dict = FragmentDictionary::new();
        let result = run(&config, &mut dict, &ethylbenzene());

        let referenced: HashSet<FragmentIndex> = result
            .records
            .iter()
            .flat_map(|r| std::iter::once(r.value).chain(r.keys.keys()))
            .collect();
        assert_eq!(referenced.len(), dict.len());
    }

    #[test]
    fn single_cuts_are_emitted_in_both_directions_when_both_sides_qualify() {
        let config = FragmentationConfig::default();
        let mut dict = FragmentDictionary::new();
        let butylbenzene = parse(&format!(
            "C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH2.CH2.CH2.CH3|{}.0-6.6-7.7-8.8-9",
            RING
        ));
        let result = run(&config, &mut dict, &butylbenzene);

        let cuts = cut_records(&result);
        let phenyl_butyl = cuts
            .iter()
            .find(|r| dict.heavy_atoms(r.keys.first()) == Some(6) && r.value_atoms == 4)
            .unwrap();
        assert!(cuts.iter().any(|r| r.keys == KeySet::single(phenyl_butyl.value)
            && r.value == phenyl_butyl.keys.first()));
    }

    #[test]
    fn equivalent_hydrogens_yield_one_variant() {
        let config = FragmentationConfig::default();
        let mut dict = FragmentDictionary::new();
        let dichloroethane = parse("Cl.CH2.CH2.Cl|0-1.1-2.2-3");
        let result = run(&config, &mut dict, &dichloroethane);

        let variants: Vec<_> = result.records.iter().filter(|r| r.hydrogen_variant).collect();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].value_atoms, 0);
        assert_eq!(dict.heavy_atoms(variants[0].keys.first()), Some(4));
    }

    #[test]
    fn toluene_has_four_distinct_hydrogen_positions() {
        let config = FragmentationConfig::default();
        let mut dict = FragmentDictionary::new();
        let result = run(&config, &mut dict, &toluene());
        let values: HashSet<_> = result
            .records
            .iter()
            .filter(|r| r.hydrogen_variant)
            .map(|r| r.value)
            .collect();
        assert_eq!(result.records.iter().filter(|r| r.hydrogen_variant).count(), 4);
        assert_eq!(values.len(), 1, "all variants share the H value");
    }

    #[test]
    fn small_molecules_get_no_hydrogen_variants() {
        let config = FragmentationConfig::default();
        let mut dict = FragmentDictionary::new();
        let result = run(&config, &mut dict, &parse("CH3.CH2.OH1|0-1.1-2"));
        assert!(result.records.iter().all(|r| !r.hydrogen_variant));
    }

    fn double_cut_triples(code: &str, dict: &mut FragmentDictionary) -> BTreeSet<(String, String, String)> {
        let config = FragmentationConfig {
            hydrogen_variants: false,
            ..FragmentationConfig::default()
        };
        let result = run(&config, dict, &parse(code));
        result
            .records
            .iter()
            .filter_map(|r| {
                let second = r.keys.second()?;
                Some((
                    dict.id(r.keys.first())?.to_string(),
                    dict.id(second)?.to_string(),
                    dict.id(r.value)?.to_string(),
                ))
            })
            .collect()
    }

    #[test]
    fn double_cut_key_order_does_not_depend_on_bond_order() {
        let atoms = "C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH2.O.CH1.CH2.CH2.CH2.CH2.CH2";
        let forward = format!(
            "{}|{}.0-6.6-7.7-8.8-9.9-10.10-11.11-12.12-13.13-8",
            atoms, RING
        );
        let reversed = format!(
            "{}|8-13.13-12.12-11.11-10.10-9.9-8.8-7.7-6.6-0.0:5.5:4.4:3.3:2.2:1.1:0",
            atoms
        );

        let mut dict = FragmentDictionary::new();
        let a = double_cut_triples(&forward, &mut dict);
        let b = double_cut_triples(&reversed, &mut dict);
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn double_cut_labels_follow_key_order() {
        let atoms = "C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH2.CH1.CH2.CH2.CH2.CH2.CH2";
        let code = format!(
            "{}|{}.0-6.6-7.7-8.8-9.9-10.10-11.11-12.12-7",
            atoms, RING
        );
        let mut dict = FragmentDictionary::new();
        let triples = double_cut_triples(&code, &mut dict);
        assert_eq!(triples.len(), 1);
        let (first, second, value) = triples.into_iter().next().unwrap();
        assert!(first.contains("R1") && !first.contains("R2"));
        assert!(second.contains("R2") && !second.contains("R1"));
        assert!(value.contains("R1") && value.contains("R2"));
    }

    #[test]
    fn double_cuts_need_two_qualifying_keys() {
        let config = FragmentationConfig::default();
        let mut dict = FragmentDictionary::new();
        let result = run(&config, &mut dict, &ethylbenzene());
        assert!(result.records.iter().all(|r| r.keys.second().is_none()));
    }

    #[test]
    fn configuration_limits_are_honoured() {
        let mut dict = FragmentDictionary::new();
        let capped = FragmentationConfig {
            max_value_atoms: Some(1),
            hydrogen_variants: false,
            ..FragmentationConfig::default()
        };
        let result = run(&capped, &mut dict, &ethylbenzene());
        assert!(result.records.iter().all(|r| r.value_atoms <= 1));
        assert!(!result.records.is_empty());

        let no_doubles = FragmentationConfig {
            double_cuts: false,
            hydrogen_variants: false,
            ..FragmentationConfig::default()
        };
        let atoms = "C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH2.CH1.CH2.CH2.CH2.CH2.CH2";
        let code = format!("{}|{}.0-6.6-7.7-8.8-9.9-10.10-11.11-12.12-7", atoms, RING);
        let result = run(&no_doubles, &mut dict, &parse(&code));
        assert!(result.records.iter().all(|r| r.keys.second().is_none()));
    }

    #[test]
    fn hydrogen_fragment_has_no_heavy_atoms() {
        let fragment = hydrogen_fragment();
        assert_eq!(fragment.heavy_atom_count(), 0);
        assert_eq!(fragment.markers().len(), 1);
    }
}
