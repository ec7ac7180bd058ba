//! Value types shared by the storage core and the HTTP layer.
//!
//! These records are derived from the filesystem and serialize naturally as
//! JSON via `serde`.

pub mod bucket;
pub mod object;
