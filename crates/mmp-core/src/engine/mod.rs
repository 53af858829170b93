//! Fragmentation and matched-pair enumeration.
//!
//! The [`fragmenter`] cuts molecules into key/value records whose fragments are
//! interned by the [`dictionary`]; the [`pair_index`] buckets those records by
//! value size and the [`enumerator`] crosses the buckets into matched pairs.

pub mod config;
pub mod dictionary;
pub mod enumerator;
pub mod error;
pub mod fragmenter;
pub mod pair_index;
pub mod progress;
pub mod records;
