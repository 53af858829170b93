//! # Workflows Module
//!
//! End-to-end pipelines built on top of the [`engine`](crate::engine) and
//! [`store`](crate::store) layers.
//!
//! - **Build Workflow** ([`build`]) - turns a stream of molecule records into a
//!   persisted matched molecular pair data set: field classification, structure
//!   grouping, fragmentation, pair enumeration and the final file write.

pub mod build;
