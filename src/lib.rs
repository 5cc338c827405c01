//! Periodic feed scraper.
//!
//! - [`scrape`] - the scheduler and per-feed worker
//! - [`feed`] - HTTP retrieval and RSS decoding
//! - [`storage`] - SQLite persistence of feeds and entries
//! - [`config`] - TOML configuration

pub mod config;
pub mod feed;
pub mod scrape;
pub mod storage;
