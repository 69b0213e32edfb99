//! Domain layer types and invariants.

pub mod bookmarks;
pub mod error;
