use crate::core::models::ids::{FragmentIndex, MoleculeIndex};
use serde::Serialize;
use std::fmt;

/// Number of bonds cut to produce a key/value record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum CutType {
    Single = 1,
    Double = 2,
}

impl CutType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Single),
            2 => Some(Self::Double),
            _ => None,
        }
    }
}

/// The ordered key fragments of a cut: one for single cuts, two for double cuts.
///
/// For double cuts the order is canonical (see the fragmenter), so `(a, b)` and
/// `(b, a)` never both describe the same physical cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KeySet {
    first: FragmentIndex,
    second: Option<FragmentIndex>,
}

impl KeySet {
    pub fn single(key: FragmentIndex) -> Self {
        Self {
            first: key,
            second: None,
        }
    }

    pub fn double(key1: FragmentIndex, key2: FragmentIndex) -> Self {
        Self {
            first: key1,
            second: Some(key2),
        }
    }

    /// Builds a key set from a slice of one or two indices.
    pub fn from_slice(keys: &[FragmentIndex]) -> Option<Self> {
        match keys {
            [k] => Some(Self::single(*k)),
            [k1, k2] => Some(Self::double(*k1, *k2)),
            _ => None,
        }
    }

    pub fn first(&self) -> FragmentIndex {
        self.first
    }

    pub fn second(&self) -> Option<FragmentIndex> {
        self.second
    }

    pub fn keys(&self) -> Vec<FragmentIndex> {
        std::iter::once(self.first).chain(self.second).collect()
    }

    pub fn cut_type(&self) -> CutType {
        if self.second.is_some() {
            CutType::Double
        } else {
            CutType::Single
        }
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.second {
            Some(second) => write!(f, "{}+{}", self.first, second),
            None => write!(f, "{}", self.first),
        }
    }
}

/// One key/value observation for one molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentationRecord {
    pub molecule: MoleculeIndex,
    pub keys: KeySet,
    pub value: FragmentIndex,
    /// Heavy-atom count of the value fragment.
    pub value_atoms: usize,
    /// Whether the record stems from a whole-molecule hydrogen substitution.
    pub hydrogen_variant: bool,
}

impl FragmentationRecord {
    pub fn cut_type(&self) -> CutType {
        self.keys.cut_type()
    }
}

/// Identity of a matched molecular pair transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MmpKey {
    pub value1: FragmentIndex,
    pub value1_atoms: usize,
    pub value2: FragmentIndex,
    pub value2_atoms: usize,
    pub cut_type: CutType,
}

/// A pair of molecules exemplifying a transformation under a shared key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PairExample {
    pub molecule1: MoleculeIndex,
    pub molecule2: MoleculeIndex,
    pub keys: KeySet,
}

/// A transformation `value1 -> value2` with all of its examples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedPair {
    pub key: MmpKey,
    pub examples: Vec<PairExample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_set_derives_cut_type() {
        assert_eq!(KeySet::single(3).cut_type(), CutType::Single);
        assert_eq!(KeySet::double(3, 4).cut_type(), CutType::Double);
        assert_eq!(KeySet::double(3, 4).keys(), vec![3, 4]);
    }

    #[test]
    fn key_set_order_matters() {
        assert_ne!(KeySet::double(1, 2), KeySet::double(2, 1));
    }

    #[test]
    fn key_set_from_slice_accepts_one_or_two_keys() {
        assert_eq!(KeySet::from_slice(&[7]), Some(KeySet::single(7)));
        assert_eq!(KeySet::from_slice(&[7, 8]), Some(KeySet::double(7, 8)));
        assert_eq!(KeySet::from_slice(&[]), None);
        assert_eq!(KeySet::from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn cut_type_round_trips_through_u8() {
        assert_eq!(CutType::from_u8(CutType::Double.as_u8()), Some(CutType::Double));
        assert_eq!(CutType::from_u8(0), None);
    }
}
