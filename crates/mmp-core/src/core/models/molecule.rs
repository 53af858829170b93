use super::atom::Atom;
use super::ids::AtomId;
use super::topology::{Bond, BondOrder};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::VecDeque;

/// Represents a molecule graph as an arena of atoms and an indexed bond list.
///
/// Atoms live in a slot map so that identifiers stay valid while copies and
/// subgraphs are derived from a molecule. Bonds are addressed by their position
/// in the bond list; an adjacency cache maps every atom to the indices of its
/// incident bonds. All derivation operations (`strip_hydrogens`, `subgraph`)
/// return new molecules and never modify the receiver.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    /// Primary storage for atoms.
    atoms: SlotMap<AtomId, Atom>,
    /// All bonds of the molecule, addressed by index.
    bonds: Vec<Bond>,
    /// Cached incident bond indices, indexed by atom ID.
    adjacency: SecondaryMap<AtomId, Vec<usize>>,
}

impl Molecule {
    /// Creates a new, empty molecule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an atom and returns its identifier.
    pub fn add_atom(&mut self, atom: Atom) -> AtomId {
        let id = self.atoms.insert(atom);
        self.adjacency.insert(id, Vec::new());
        id
    }

    /// Adds a bond between two atoms.
    ///
    /// This method is idempotent; adding a bond between already bonded atoms
    /// returns the index of the existing bond.
    ///
    /// # Arguments
    ///
    /// * `atom1_id` - ID of the first atom.
    /// * `atom2_id` - ID of the second atom.
    /// * `order` - The order of the bond.
    ///
    /// # Return
    ///
    /// Returns the bond index, or `None` if either atom does not exist or both
    /// IDs are the same atom.
    pub fn add_bond(&mut self, atom1_id: AtomId, atom2_id: AtomId, order: BondOrder) -> Option<usize> {
        if atom1_id == atom2_id
            || !self.atoms.contains_key(atom1_id)
            || !self.atoms.contains_key(atom2_id)
        {
            return None;
        }
        if let Some(existing) = self.bond_between(atom1_id, atom2_id) {
            return Some(existing);
        }
        let index = self.bonds.len();
        self.bonds.push(Bond::new(atom1_id, atom2_id, order));
        self.adjacency[atom1_id].push(index);
        self.adjacency[atom2_id].push(index);
        Some(index)
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.get_mut(id)
    }

    /// Returns an iterator over all atoms in insertion order.
    pub fn atoms_iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.atoms.iter()
    }

    /// Returns all atom IDs in insertion order.
    pub fn atom_ids(&self) -> Vec<AtomId> {
        self.atoms.keys().collect()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond(&self, index: usize) -> Option<&Bond> {
        self.bonds.get(index)
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// Returns the bonded neighbours of an atom together with the connecting bond index.
    pub fn neighbors(&self, id: AtomId) -> impl Iterator<Item = (AtomId, usize)> + '_ {
        self.adjacency
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |&bond_idx| {
                self.bonds[bond_idx]
                    .other(id)
                    .map(|neighbor| (neighbor, bond_idx))
            })
    }

    pub fn degree(&self, id: AtomId) -> usize {
        self.adjacency.get(id).map_or(0, |v| v.len())
    }

    /// Finds the index of the bond connecting two atoms.
    pub fn bond_between(&self, atom1_id: AtomId, atom2_id: AtomId) -> Option<usize> {
        self.adjacency.get(atom1_id).and_then(|incident| {
            incident
                .iter()
                .copied()
                .find(|&b| self.bonds[b].other(atom1_id) == Some(atom2_id))
        })
    }

    /// Counts atoms that are neither hydrogens nor R-group markers.
    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.values().filter(|a| a.is_heavy()).count()
    }

    /// Returns all R-group marker atoms with their labels, in insertion order.
    pub fn markers(&self) -> Vec<(AtomId, u8)> {
        self.atoms
            .iter()
            .filter_map(|(id, atom)| atom.rgroup.map(|label| (id, label)))
            .collect()
    }

    /// Returns a copy with every explicit hydrogen folded into the implicit
    /// hydrogen count of its bonded heavy atom.
    ///
    /// Hydrogens that are not bonded to an ordinary atom (e.g. in H2 or bonded to a
    /// marker) are dropped without a trace.
    pub fn strip_hydrogens(&self) -> Molecule {
        let mut stripped = Molecule::new();
        let mut mapping: SecondaryMap<AtomId, AtomId> = SecondaryMap::new();

        for (id, atom) in self.atoms.iter() {
            if !atom.is_hydrogen() {
                mapping.insert(id, stripped.add_atom(atom.clone()));
            }
        }
        for (id, atom) in self.atoms.iter() {
            if !atom.is_hydrogen() {
                continue;
            }
            for (neighbor, _) in self.neighbors(id) {
                if let Some(&target) = mapping.get(neighbor) {
                    if let Some(host) = stripped.atom_mut(target) {
                        if !host.is_marker() {
                            host.hydrogens = host.hydrogens.saturating_add(1);
                        }
                    }
                }
            }
        }
        for bond in &self.bonds {
            if let (Some(&a), Some(&b)) = (mapping.get(bond.atom1_id), mapping.get(bond.atom2_id)) {
                stripped.add_bond(a, b, bond.order);
            }
        }
        stripped
    }

    /// Flags every bond that is part of a ring.
    ///
    /// A bond is a ring bond exactly when it is not a bridge of the molecule graph;
    /// bridges are found with an iterative Tarjan low-link traversal.
    pub fn ring_bonds(&self) -> Vec<bool> {
        let mut disc: SecondaryMap<AtomId, usize> = SecondaryMap::new();
        let mut low: SecondaryMap<AtomId, usize> = SecondaryMap::new();
        let mut is_bridge = vec![false; self.bonds.len()];
        let mut timer = 0usize;

        for root in self.atoms.keys() {
            if disc.contains_key(root) {
                continue;
            }
            disc.insert(root, timer);
            low.insert(root, timer);
            timer += 1;

            // (atom, bond used to reach it, next incident bond cursor)
            let mut stack: Vec<(AtomId, Option<usize>, usize)> = vec![(root, None, 0)];
            while let Some(frame) = stack.last_mut() {
                let (node, parent_bond) = (frame.0, frame.1);
                let incident = &self.adjacency[node];
                if frame.2 < incident.len() {
                    let bond_idx = incident[frame.2];
                    frame.2 += 1;
                    if Some(bond_idx) == parent_bond {
                        continue;
                    }
                    let Some(next) = self.bonds[bond_idx].other(node) else {
                        continue;
                    };
                    if let Some(&d) = disc.get(next) {
                        low[node] = low[node].min(d);
                    } else {
                        disc.insert(next, timer);
                        low.insert(next, timer);
                        timer += 1;
                        stack.push((next, Some(bond_idx), 0));
                    }
                } else {
                    stack.pop();
                    if let (Some(bond_idx), Some(parent)) = (parent_bond, stack.last()) {
                        let p = parent.0;
                        low[p] = low[p].min(low[node]);
                        if low[node] > disc[p] {
                            is_bridge[bond_idx] = true;
                        }
                    }
                }
            }
        }

        is_bridge.into_iter().map(|bridge| !bridge).collect()
    }

    /// Returns the indices of all rotatable bonds: non-ring single bonds between
    /// two heavy atoms, in bond-list order.
    pub fn rotatable_bonds(&self) -> Vec<usize> {
        let ring = self.ring_bonds();
        self.bonds
            .iter()
            .enumerate()
            .filter(|(idx, bond)| {
                bond.order == BondOrder::Single
                    && !ring[*idx]
                    && self.atoms.get(bond.atom1_id).is_some_and(Atom::is_heavy)
                    && self.atoms.get(bond.atom2_id).is_some_and(Atom::is_heavy)
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Splits the molecule into connected components, ignoring the given bonds.
    ///
    /// Components are discovered in atom insertion order, and atoms inside a
    /// component are listed in breadth-first order.
    pub fn components_without(&self, masked_bonds: &[usize]) -> Vec<Vec<AtomId>> {
        let mut seen: SecondaryMap<AtomId, ()> = SecondaryMap::new();
        let mut components = Vec::new();

        for start in self.atoms.keys() {
            if seen.contains_key(start) {
                continue;
            }
            seen.insert(start, ());
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            while let Some(atom) = queue.pop_front() {
                component.push(atom);
                for (neighbor, bond_idx) in self.neighbors(atom) {
                    if masked_bonds.contains(&bond_idx) || seen.contains_key(neighbor) {
                        continue;
                    }
                    seen.insert(neighbor, ());
                    queue.push_back(neighbor);
                }
            }
            components.push(component);
        }
        components
    }

    /// Extracts the subgraph induced by `atom_ids`.
    ///
    /// # Return
    ///
    /// The new molecule and a map from the original atom IDs to their IDs in the
    /// subgraph. Only bonds with both endpoints in the selection are copied.
    pub fn subgraph(&self, atom_ids: &[AtomId]) -> (Molecule, SecondaryMap<AtomId, AtomId>) {
        let mut sub = Molecule::new();
        let mut mapping: SecondaryMap<AtomId, AtomId> = SecondaryMap::new();
        for &id in atom_ids {
            if mapping.contains_key(id) {
                continue;
            }
            if let Some(atom) = self.atoms.get(id) {
                mapping.insert(id, sub.add_atom(atom.clone()));
            }
        }
        for bond in &self.bonds {
            if let (Some(&a), Some(&b)) = (mapping.get(bond.atom1_id), mapping.get(bond.atom2_id)) {
                sub.add_bond(a, b, bond.order);
            }
        }
        (sub, mapping)
    }

    /// Returns atoms within `radius` bonds of any of the `roots`, in BFS order.
    pub fn sphere(&self, roots: &[AtomId], radius: usize) -> Vec<AtomId> {
        let mut depth: SecondaryMap<AtomId, usize> = SecondaryMap::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        for &root in roots {
            if self.atoms.contains_key(root) && !depth.contains_key(root) {
                depth.insert(root, 0);
                order.push(root);
                queue.push_back(root);
            }
        }
        while let Some(atom) = queue.pop_front() {
            let d = depth[atom];
            if d == radius {
                continue;
            }
            for (neighbor, _) in self.neighbors(atom) {
                if !depth.contains_key(neighbor) {
                    depth.insert(neighbor, d + 1);
                    order.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(symbols: &[&str]) -> (Molecule, Vec<AtomId>) {
        let mut mol = Molecule::new();
        let ids: Vec<AtomId> = symbols.iter().map(|s| mol.add_atom(Atom::new(s))).collect();
        for pair in ids.windows(2) {
            mol.add_bond(pair[0], pair[1], BondOrder::Single);
        }
        (mol, ids)
    }

    fn cyclohexyl_methane() -> Molecule {
        let (mut mol, ids) = chain(&["C", "C", "C", "C", "C", "C"]);
        mol.add_bond(ids[5], ids[0], BondOrder::Single);
        let methyl = mol.add_atom(Atom::new("C"));
        mol.add_bond(ids[0], methyl, BondOrder::Single);
        mol
    }

    #[test]
    fn add_bond_is_idempotent_and_rejects_self_bonds() {
        let (mut mol, ids) = chain(&["C", "O"]);
        assert_eq!(mol.add_bond(ids[0], ids[1], BondOrder::Single), Some(0));
        assert_eq!(mol.add_bond(ids[1], ids[0], BondOrder::Double), Some(0));
        assert_eq!(mol.add_bond(ids[0], ids[0], BondOrder::Single), None);
        assert_eq!(mol.bond_count(), 1);
    }

    #[test]
    fn strip_hydrogens_folds_explicit_hydrogens() {
        let mut mol = Molecule::new();
        let c = mol.add_atom(Atom::new("C"));
        for _ in 0..3 {
            let h = mol.add_atom(Atom::new("H"));
            mol.add_bond(c, h, BondOrder::Single);
        }
        let o = mol.add_atom(Atom::new("O").with_hydrogens(1));
        mol.add_bond(c, o, BondOrder::Single);

        let stripped = mol.strip_hydrogens();
        assert_eq!(stripped.atom_count(), 2);
        assert_eq!(stripped.bond_count(), 1);
        let hydrogens: Vec<u8> = stripped.atoms_iter().map(|(_, a)| a.hydrogens).collect();
        assert_eq!(hydrogens, vec![3, 1]);
        assert_eq!(mol.atom_count(), 5, "original must be untouched");
    }

    #[test]
    fn ring_bonds_distinguish_ring_from_chain() {
        let mol = cyclohexyl_methane();
        let ring = mol.ring_bonds();
        assert_eq!(ring.iter().filter(|&&r| r).count(), 6);
        assert!(!ring[6]);
    }

    #[test]
    fn rotatable_bonds_exclude_ring_and_multiple_bonds() {
        let mol = cyclohexyl_methane();
        assert_eq!(mol.rotatable_bonds(), vec![6]);

        let (mut acyl, ids) = chain(&["C", "C"]);
        let o = acyl.add_atom(Atom::new("O"));
        acyl.add_bond(ids[1], o, BondOrder::Double);
        assert_eq!(acyl.rotatable_bonds(), vec![0]);
    }

    #[test]
    fn components_without_splits_at_masked_bonds() {
        let (mol, ids) = chain(&["C", "C", "N", "C", "O"]);
        let components = mol.components_without(&[1, 3]);
        assert_eq!(components.len(), 3);
        assert_eq!(components[0], vec![ids[0], ids[1]]);
        assert_eq!(components[1], vec![ids[2], ids[3]]);
        assert_eq!(components[2], vec![ids[4]]);
    }

    #[test]
    fn subgraph_copies_only_internal_bonds() {
        let (mol, ids) = chain(&["C", "C", "N", "C"]);
        let (sub, mapping) = mol.subgraph(&[ids[1], ids[2]]);
        assert_eq!(sub.atom_count(), 2);
        assert_eq!(sub.bond_count(), 1);
        assert!(mapping.contains_key(ids[1]));
        assert!(!mapping.contains_key(ids[0]));
    }

    #[test]
    fn sphere_grows_breadth_first_from_roots() {
        let (mol, ids) = chain(&["R", "C", "C", "C"]);
        assert_eq!(mol.sphere(&[ids[0]], 1), vec![ids[0], ids[1]]);
        assert_eq!(mol.sphere(&[ids[0]], 10).len(), 4);
    }

    #[test]
    fn heavy_atom_count_ignores_markers_and_hydrogens() {
        let mut mol = Molecule::new();
        let c = mol.add_atom(Atom::new("C"));
        let r = mol.add_atom(Atom::marker(1));
        let h = mol.add_atom(Atom::new("H"));
        mol.add_bond(c, r, BondOrder::Single);
        mol.add_bond(c, h, BondOrder::Single);
        assert_eq!(mol.heavy_atom_count(), 1);
        assert_eq!(mol.markers(), vec![(r, 1)]);
    }
}
