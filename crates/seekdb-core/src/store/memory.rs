//! In-memory [`CollectionStore`] implementation for tests.
//!
//! Collections live in a `BTreeMap` behind `std::sync::RwLock`; every
//! search is evaluated by [`crate::search`] over the records in insertion
//! order.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{
    CollectionInfo, GetRequest, GetResult, HybridSearchRequest, QueryRequest, QueryResult, Record,
};
use crate::search;

use super::{missing_collection, validate_batch, CollectionStore};

struct StoredCollection {
    info: CollectionInfo,
    records: Vec<Record>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, StoredCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredCollection>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("In-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredCollection>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("In-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self.read()?.values().map(|c| c.info.clone()).collect())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.read()?.get(name).map(|c| c.info.clone()))
    }

    async fn create_collection(&self, info: &CollectionInfo) -> Result<()> {
        let mut collections = self.write()?;
        if collections.contains_key(&info.name) {
            bail!("Collection '{}' already exists", info.name);
        }
        collections.insert(
            info.name.clone(),
            StoredCollection {
                info: info.clone(),
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| missing_collection(name))
    }

    async fn add(&self, collection: &str, records: &[Record]) -> Result<()> {
        let mut collections = self.write()?;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        validate_batch(
            &stored.info,
            records,
            stored.records.iter().map(|r| r.id.as_str()),
        )?;
        stored.records.extend_from_slice(records);
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.read()?
            .get(collection)
            .map(|c| c.records.len())
            .ok_or_else(|| missing_collection(collection))
    }

    async fn get(&self, collection: &str, req: &GetRequest) -> Result<GetResult> {
        let collections = self.read()?;
        let stored = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        Ok(search::get(&stored.records, req))
    }

    async fn query(&self, collection: &str, req: &QueryRequest) -> Result<QueryResult> {
        let collections = self.read()?;
        let stored = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        Ok(search::query(&stored.records, stored.info.distance, req))
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        req: &HybridSearchRequest,
    ) -> Result<QueryResult> {
        let collections = self.read()?;
        let stored = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        Ok(search::hybrid(&stored.records, stored.info.distance, req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DistanceMetric;
    use serde_json::json;

    fn info(name: &str, dimension: usize) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            dimension,
            distance: DistanceMetric::Cosine,
            embedding_model: None,
        }
    }

    fn record(id: &str, embedding: Vec<f32>) -> Record {
        Record {
            id: id.to_string(),
            document: Some(format!("doc {}", id)),
            metadata: json!({"id": id}).as_object().cloned().unwrap(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let store = InMemoryStore::new();
        store.create_collection(&info("b", 2)).await.unwrap();
        store.create_collection(&info("a", 2)).await.unwrap();
        assert!(store.create_collection(&info("a", 2)).await.is_err());

        let names: Vec<String> = store
            .list_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        store.delete_collection("a").await.unwrap();
        assert!(store.get_collection("a").await.unwrap().is_none());
        assert!(store.delete_collection("a").await.is_err());
    }

    #[tokio::test]
    async fn test_add_validates_dimension_and_duplicates() {
        let store = InMemoryStore::new();
        store.create_collection(&info("c", 2)).await.unwrap();
        store
            .add("c", &[record("r1", vec![1.0, 0.0])])
            .await
            .unwrap();

        let wrong_dim = store.add("c", &[record("r2", vec![1.0])]).await;
        assert!(wrong_dim.unwrap_err().to_string().contains("dimension"));

        let dup = store.add("c", &[record("r1", vec![0.0, 1.0])]).await;
        assert!(dup.unwrap_err().to_string().contains("Duplicate id"));

        let dup_in_batch = store
            .add("c", &[record("r3", vec![0.0, 1.0]), record("r3", vec![0.0, 1.0])])
            .await;
        assert!(dup_in_batch.is_err());
        assert_eq!(store.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_peek_includes_embeddings() {
        let store = InMemoryStore::new();
        store.create_collection(&info("c", 2)).await.unwrap();
        store
            .add(
                "c",
                &[
                    record("r1", vec![1.0, 0.0]),
                    record("r2", vec![0.0, 1.0]),
                    record("r3", vec![0.5, 0.5]),
                ],
            )
            .await
            .unwrap();
        let peek = store.peek("c", 2).await.unwrap();
        assert_eq!(peek.ids, vec!["r1", "r2"]);
        assert_eq!(peek.embeddings.unwrap()[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_operations_on_missing_collection_fail() {
        let store = InMemoryStore::new();
        assert!(store.count("nope").await.is_err());
        assert!(store.get("nope", &GetRequest::default()).await.is_err());
    }
}
