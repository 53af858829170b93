use std::fmt;

/// Element symbol used for R-group marker atoms.
pub const RGROUP_SYMBOL: &str = "R";

/// Represents a single atom of a molecule graph.
///
/// Hydrogens are normally implicit (counted in `hydrogens`); explicit hydrogen
/// atoms only appear in freshly parsed input and are folded away by
/// [`Molecule::strip_hydrogens`](super::molecule::Molecule::strip_hydrogens).
/// R-group markers are atoms with the symbol `R` and a label; label `0` denotes a
/// generic, unnumbered marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    /// The element symbol (e.g., "C", "Cl"), or `R` for an R-group marker.
    pub symbol: String,
    /// The formal charge.
    pub charge: i8,
    /// Whether the atom is part of an aromatic system.
    pub aromatic: bool,
    /// Number of implicit hydrogens.
    pub hydrogens: u8,
    /// R-group label for marker atoms (`None` for ordinary atoms).
    pub rgroup: Option<u8>,
}

impl Atom {
    /// Creates a neutral, non-aromatic atom without implicit hydrogens.
    ///
    /// # Arguments
    ///
    /// * `symbol` - The element symbol.
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            charge: 0,
            aromatic: false,
            hydrogens: 0,
            rgroup: None,
        }
    }

    /// Creates an R-group marker atom carrying the given label.
    pub fn marker(label: u8) -> Self {
        Self {
            rgroup: Some(label),
            ..Self::new(RGROUP_SYMBOL)
        }
    }

    /// Sets the implicit hydrogen count.
    pub fn with_hydrogens(mut self, hydrogens: u8) -> Self {
        self.hydrogens = hydrogens;
        self
    }

    /// Sets the aromatic flag.
    pub fn with_aromatic(mut self, aromatic: bool) -> Self {
        self.aromatic = aromatic;
        self
    }

    /// Sets the formal charge.
    pub fn with_charge(mut self, charge: i8) -> Self {
        self.charge = charge;
        self
    }

    /// Returns `true` if this atom is an R-group marker.
    pub fn is_marker(&self) -> bool {
        self.rgroup.is_some()
    }

    /// Returns `true` if this atom is an explicit hydrogen.
    pub fn is_hydrogen(&self) -> bool {
        self.rgroup.is_none() && self.symbol == "H"
    }

    /// Returns `true` for atoms that count towards the heavy-atom count.
    ///
    /// Markers and hydrogens are excluded.
    pub fn is_heavy(&self) -> bool {
        !self.is_marker() && !self.is_hydrogen()
    }
}

impl fmt::Display for Atom {
    /// Formats the atom as a graph-code token, e.g. `C`, `C*H1`, `N+1`, `R2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = self.rgroup {
            return if label == 0 {
                write!(f, "{}", RGROUP_SYMBOL)
            } else {
                write!(f, "{}{}", RGROUP_SYMBOL, label)
            };
        }
        write!(f, "{}", self.symbol)?;
        if self.aromatic {
            write!(f, "*")?;
        }
        if self.hydrogens > 0 {
            write!(f, "H{}", self.hydrogens)?;
        }
        if self.charge > 0 {
            write!(f, "+{}", self.charge)?;
        } else if self.charge < 0 {
            write!(f, "-{}", -(self.charge as i16))?;
        }
        Ok(())
    }
}
