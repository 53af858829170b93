//! # Core Module
//!
//! Stateless building blocks of the matched molecular pair engine.
//!
//! - **Molecular Representation** ([`models`]) - Arena molecule graphs, atoms, bonds
//! - **Canonicalization** ([`canonical`]) - The canonical-ID oracle and its reference implementation
//! - **Field Data** ([`fields`]) - Value parsing, field classification and potency conversion
//! - **Input** ([`io`]) - Molecule record sources

pub mod canonical;
pub mod fields;
pub mod io;
pub mod models;
