//! Megafeed - a deduplicating RSS/Atom aggregator
//!
//! A background scheduler polls the configured feeds, classifies entries by
//! source, drops anything already ingested and commits each cycle's new
//! articles in one transaction. A small read-only web layer lists them.

pub mod classifier;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod routes;
pub mod scheduler;
pub mod store;
