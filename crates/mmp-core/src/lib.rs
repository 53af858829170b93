//! # mmpairs
//!
//! Matched molecular pair analysis: every molecule of a data set is cut at its
//! rotatable bonds into *key* and *value* fragments, molecules sharing a key are
//! paired, and the resulting transformations can be queried with similarity-scored
//! examples and per-field statistics.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Stateless molecule graphs, the canonicalization
//!   seam, field value classification and molecule input sources.
//!
//! - **[`engine`]: The Logic Core.** The fragmenter, the fragment dictionary, the
//!   size-bucketed pair index and the parallel pair enumerator, together with their
//!   configuration, progress reporting and errors.
//!
//! - **[`store`]: Persistence.** Writer and reader of the block-structured text
//!   format a built data set lives in.
//!
//! - **[`query`]: The Read Side.** Loaded data sets, the query engine, statistics,
//!   virtual molecules, export and the named data set registry.
//!
//! - **[`workflows`]: The Public API.** The end-to-end build pipeline tying the
//!   layers together.

pub mod core;
pub mod engine;
pub mod query;
pub mod store;
pub mod workflows;
