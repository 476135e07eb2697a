//! # seekdb skills
//!
//! Command-line tooling around the seekdb vector database: import CSV/Excel
//! files into collections, query them (semantic, full-text, hybrid, scalar
//! filters) and export results, preview spreadsheets, generate a searchable
//! documentation catalog with an LLM, and install agent skills into AI tool
//! folders.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌────────────────────┐
//! │ import/query │──▶│  Client  │──▶│ CollectionStore     │
//! │  (CLI)       │   │ + embed  │   │ SQLite | seekdb SQL │
//! └──────────────┘   └──────────┘   └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and env overrides |
//! | [`client`] | Collections on top of a store and an embedding provider |
//! | [`embedding`] | Local, OpenAI, and Ollama embedding providers |
//! | [`sqlite_store`] | Embedded backend |
//! | [`server_store`] | seekdb server backend (MySQL protocol) |
//! | [`tabular`] | CSV/Excel reading and export |
//! | [`import`] | `seekdb import` |
//! | [`query`] | `seekdb query` |
//! | [`inspect`] | `seekdb inspect` |
//! | [`catalog`] | `seekdb catalog` |
//! | [`install`] | `seekdb install` |

pub mod catalog;
pub mod client;
pub mod config;
pub mod db;
pub mod embedding;
pub mod import;
pub mod inspect;
pub mod install;
pub mod llm;
pub mod migrate;
pub mod query;
pub mod server_store;
pub mod sqlite_store;
pub mod tabular;
