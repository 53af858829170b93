use super::ids::AtomId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// The single-character separator used between atom indices in graph codes.
    pub fn code_char(self) -> char {
        match self {
            Self::Single => '-',
            Self::Double => '=',
            Self::Triple => '#',
            Self::Aromatic => ':',
        }
    }

    pub fn from_code_char(c: char) -> Option<Self> {
        match c {
            '-' => Some(Self::Single),
            '=' => Some(Self::Double),
            '#' => Some(Self::Triple),
            ':' => Some(Self::Aromatic),
            _ => None,
        }
    }

    /// Valence contribution used when folding hydrogens and grafting fragments.
    pub fn valence(self) -> u8 {
        match self {
            Self::Single | Self::Aromatic => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid bond order string")]
pub struct ParseBondOrderError;

impl FromStr for BondOrder {
    type Err = ParseBondOrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "s" | "single" | "-" => Ok(Self::Single),
            "2" | "d" | "double" | "=" => Ok(Self::Double),
            "3" | "t" | "triple" | "#" => Ok(Self::Triple),
            "ar" | "aromatic" | ":" => Ok(Self::Aromatic),
            _ => Err(ParseBondOrderError),
        }
    }
}

impl fmt::Display for BondOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Aromatic => "Aromatic",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1_id: AtomId, // first endpoint, defines the key side of a single cut
    pub atom2_id: AtomId,
    pub order: BondOrder,
}

impl Bond {
    pub fn new(atom1_id: AtomId, atom2_id: AtomId, order: BondOrder) -> Self {
        Self {
            atom1_id,
            atom2_id,
            order,
        }
    }

    pub fn contains(&self, atom_id: AtomId) -> bool {
        self.atom1_id == atom_id || self.atom2_id == atom_id
    }

    /// Returns the endpoint opposite to `atom_id`, if `atom_id` is part of this bond.
    pub fn other(&self, atom_id: AtomId) -> Option<AtomId> {
        if self.atom1_id == atom_id {
            Some(self.atom2_id)
        } else if self.atom2_id == atom_id {
            Some(self.atom1_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn dummy_atom_id(n: u64) -> AtomId {
        AtomId::from(KeyData::from_ffi(n))
    }

    #[test]
    fn bond_order_from_str_parses_valid_strings() {
        assert_eq!("1".parse::<BondOrder>().unwrap(), BondOrder::Single);
        assert_eq!("-".parse::<BondOrder>().unwrap(), BondOrder::Single);
        assert_eq!("D".parse::<BondOrder>().unwrap(), BondOrder::Double);
        assert_eq!("#".parse::<BondOrder>().unwrap(), BondOrder::Triple);
        assert_eq!("aromatic".parse::<BondOrder>().unwrap(), BondOrder::Aromatic);
    }

    #[test]
    fn bond_order_from_str_rejects_invalid_strings() {
        assert!("".parse::<BondOrder>().is_err());
        assert!("quadruple".parse::<BondOrder>().is_err());
    }

    #[test]
    fn code_chars_round_trip() {
        for order in [
            BondOrder::Single,
            BondOrder::Double,
            BondOrder::Triple,
            BondOrder::Aromatic,
        ] {
            assert_eq!(BondOrder::from_code_char(order.code_char()), Some(order));
        }
        assert_eq!(BondOrder::from_code_char('~'), None);
    }

    #[test]
    fn bond_other_returns_opposite_endpoint() {
        let a1 = dummy_atom_id(1);
        let a2 = dummy_atom_id(2);
        let bond = Bond::new(a1, a2, BondOrder::Single);
        assert_eq!(bond.other(a1), Some(a2));
        assert_eq!(bond.other(a2), Some(a1));
        assert_eq!(bond.other(dummy_atom_id(3)), None);
        assert!(bond.contains(a1));
    }
}
