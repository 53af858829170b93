use slotmap::new_key_type;

new_key_type! {
    pub struct AtomId;
}

/// Position of a unique structure in the molecule table (first-seen order).
pub type MoleculeIndex = usize;

/// Position of a canonical fragment in the fragment dictionary.
pub type FragmentIndex = usize;
