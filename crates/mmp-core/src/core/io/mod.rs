//! Input collaborators: the record stream contract consumed by the build
//! workflow and a tab-delimited table reader implementing it.

pub mod source;
