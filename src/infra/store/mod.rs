//! Storage backends for bookmark records.

pub mod file;
pub mod redb;
