//! Read-side of a persisted data set.
//!
//! A [`dataset::DataSet`] rebuilds the lookup indices from a loaded file; the
//! [`engine::QueryEngine`] answers chemical-space and transformation queries over
//! it. Data sets are immutable after loading and can be shared between threads
//! through the [`registry::DataSetRegistry`].

pub mod dataset;
pub mod engine;
pub mod error;
pub mod export;
pub mod registry;
pub mod stats;
pub mod virtual_molecule;
