//! Magpie keeps a personal archive of tweets: save them by URL, tag and
//! annotate them, then search, list, and export the collection.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
