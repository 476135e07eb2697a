//! # seekdb core
//!
//! Shared logic for the seekdb skills toolkit: record and result models,
//! metadata/document filters, the collection store abstraction, local
//! search with reciprocal rank fusion, and result flattening.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Backends that
//! talk to SQLite or a seekdb server live in the `seekdb-skills` crate.

pub mod embedding;
pub mod filter;
pub mod models;
pub mod search;
pub mod store;
pub mod table;
