//! Persistence of built data sets.

pub mod error;
pub mod format;
pub mod reader;
pub mod spool;
pub mod writer;
