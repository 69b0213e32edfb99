//! Application services layer scaffolding.

pub mod auth;
pub mod bookmarks;
pub mod error;
pub mod export;
pub mod pagination;
pub mod store;
