//! Storage abstraction for seekdb collections.
//!
//! The [`CollectionStore`] trait defines every storage operation the
//! collection client needs, so the embedded (SQLite), server (seekdb over
//! the MySQL protocol), and in-memory backends are interchangeable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Stores never compute embeddings: records and query requests arrive
//! with vectors already filled in.

pub mod memory;

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{
    CollectionInfo, GetRequest, GetResult, HybridSearchRequest, Include, IncludeField,
    QueryRequest, QueryResult, Record,
};

/// Abstract storage backend for collections.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_collections`](CollectionStore::list_collections) | All collections, sorted by name |
/// | [`get_collection`](CollectionStore::get_collection) | Look up one collection |
/// | [`create_collection`](CollectionStore::create_collection) | Create an empty collection |
/// | [`delete_collection`](CollectionStore::delete_collection) | Drop a collection and its records |
/// | [`add`](CollectionStore::add) | Insert a batch of records |
/// | [`count`](CollectionStore::count) | Number of records |
/// | [`get`](CollectionStore::get) | Fetch by ids and/or filters |
/// | [`query`](CollectionStore::query) | Nearest-neighbour search |
/// | [`hybrid_search`](CollectionStore::hybrid_search) | Full-text + kNN with rank fusion |
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Create a collection. Fails if one with the same name exists.
    async fn create_collection(&self, info: &CollectionInfo) -> Result<()>;

    /// Delete a collection. Fails if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert records. Ids must be new to the collection.
    async fn add(&self, collection: &str, records: &[Record]) -> Result<()>;

    async fn count(&self, collection: &str) -> Result<usize>;

    async fn get(&self, collection: &str, req: &GetRequest) -> Result<GetResult>;

    async fn query(&self, collection: &str, req: &QueryRequest) -> Result<QueryResult>;

    async fn hybrid_search(
        &self,
        collection: &str,
        req: &HybridSearchRequest,
    ) -> Result<QueryResult>;

    /// First `limit` records with documents, metadatas, and embeddings.
    async fn peek(&self, collection: &str, limit: usize) -> Result<GetResult> {
        let req = GetRequest {
            limit: Some(limit),
            include: Include::new(vec![
                IncludeField::Documents,
                IncludeField::Metadatas,
                IncludeField::Embeddings,
            ]),
            ..Default::default()
        };
        self.get(collection, &req).await
    }
}

/// Check a batch before insertion: every embedding has the collection's
/// dimension and no id repeats within the batch or against `existing`.
pub fn validate_batch<'a, I>(info: &CollectionInfo, records: &[Record], existing: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let existing: HashSet<&str> = existing.into_iter().collect();
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if record.id.is_empty() {
            bail!("Record ids must not be empty");
        }
        if record.embedding.len() != info.dimension {
            bail!(
                "Embedding dimension {} does not match collection '{}' dimension {}",
                record.embedding.len(),
                info.name,
                info.dimension
            );
        }
        if !seen.insert(record.id.as_str()) || existing.contains(record.id.as_str()) {
            bail!(
                "Duplicate id '{}' in collection '{}'",
                record.id,
                info.name
            );
        }
    }
    Ok(())
}

/// Error for operations on a collection that does not exist.
pub fn missing_collection(name: &str) -> anyhow::Error {
    anyhow::anyhow!("Collection '{}' does not exist", name)
}
