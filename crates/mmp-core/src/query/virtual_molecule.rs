use crate::core::canonical::{CanonicalError, Canonicalizer};
use crate::core::models::ids::AtomId;
use crate::core::models::molecule::Molecule;
use crate::core::models::topology::BondOrder;
use slotmap::SecondaryMap;

/// Copies every atom and bond of `source` into `target`.
fn merge_into(target: &mut Molecule, source: &Molecule) -> SecondaryMap<AtomId, AtomId> {
    let mut mapping = SecondaryMap::new();
    for (id, atom) in source.atoms_iter() {
        mapping.insert(id, target.add_atom(atom.clone()));
    }
    for bond in source.bonds() {
        if let (Some(&a), Some(&b)) = (mapping.get(bond.atom1_id), mapping.get(bond.atom2_id)) {
            target.add_bond(a, b, bond.order);
        }
    }
    mapping
}

/// The atom bonded to a marker, with the bond order.
fn attachment(molecule: &Molecule, marker: AtomId) -> Option<(AtomId, BondOrder)> {
    molecule.neighbors(marker).next().and_then(|(neighbor, bond_idx)| {
        molecule.bond(bond_idx).map(|bond| (neighbor, bond.order))
    })
}

/// Joins key fragments and a value fragment at equally labelled markers.
///
/// Every marker label of the value must appear on exactly one key. The markers
/// are dropped and their neighbours bonded directly; explicit hydrogens (the `H`
/// value) are folded into implicit counts afterwards.
///
/// # Return
///
/// The grafted molecule, or `Ok(None)` if the markers do not match up.
pub fn graft(
    canonicalizer: &dyn Canonicalizer,
    keys: &[&str],
    value: &str,
) -> Result<Option<Molecule>, CanonicalError> {
    let mut combined = Molecule::new();
    let value_molecule = canonicalizer.parse(value)?;
    let value_map = merge_into(&mut combined, &value_molecule);
    let mut key_markers = Vec::new();
    for key in keys {
        let key_molecule = canonicalizer.parse(key)?;
        let key_map = merge_into(&mut combined, &key_molecule);
        key_markers.extend(
            key_molecule
                .markers()
                .into_iter()
                .map(|(id, label)| (key_map[id], label)),
        );
    }

    let value_markers: Vec<(AtomId, u8)> = value_molecule
        .markers()
        .into_iter()
        .map(|(id, label)| (value_map[id], label))
        .collect();
    if value_markers.len() != key_markers.len() {
        return Ok(None);
    }

    let mut joins = Vec::new();
    for &(value_marker, label) in &value_markers {
        let mut matching = key_markers.iter().filter(|(_, l)| *l == label);
        let (Some(&(key_marker, _)), None) = (matching.next(), matching.next()) else {
            return Ok(None);
        };
        let (Some((value_atom, _)), Some((key_atom, order))) = (
            attachment(&combined, value_marker),
            attachment(&combined, key_marker),
        ) else {
            return Ok(None);
        };
        joins.push((key_atom, value_atom, order));
    }

    let kept: Vec<AtomId> = combined
        .atoms_iter()
        .filter(|(_, atom)| !atom.is_marker())
        .map(|(id, _)| id)
        .collect();
    let (mut product, mapping) = combined.subgraph(&kept);
    for (a, b, order) in joins {
        if let (Some(&a), Some(&b)) = (mapping.get(a), mapping.get(b)) {
            product.add_bond(a, b, order);
        }
    }
    Ok(Some(product.strip_hydrogens()))
}
