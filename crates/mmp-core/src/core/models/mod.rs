//! # Core Models Module
//!
//! Data structures for representing molecule graphs in the MMP engine.
//!
//! - [`atom`] - Atoms, including R-group marker atoms used as attachment points
//! - [`topology`] - Bonds and bond orders
//! - [`molecule`] - The arena-backed molecule graph and its derivation operations
//! - [`ids`] - Atom keys and the index types shared by the engine and the store
//!
//! ```ignore
//! use mmpairs::core::models::{atom::Atom, molecule::Molecule, topology::BondOrder};
//!
//! let mut mol = Molecule::new();
//! let c = mol.add_atom(Atom::new("C").with_hydrogens(3));
//! let r = mol.add_atom(Atom::marker(1));
//! mol.add_bond(c, r, BondOrder::Single);
//! ```

pub mod atom;
pub mod ids;
pub mod molecule;
pub mod topology;
