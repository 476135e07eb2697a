//! Collection client.
//!
//! [`Client`] wraps a [`CollectionStore`] and the configured embedding
//! provider. [`Collection`] handles adding records and querying them by
//! text, embedding documents and query texts before they reach the store.
//!
//! The embedding provider is created lazily on first use, so commands
//! that never embed (listing, `get`, collection info) work without a
//! model download or an API key.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::OnceCell;

use seekdb_core::filter::{DocumentFilter, Filter};
use seekdb_core::models::{
    validate_collection_name, CollectionInfo, FullTextClause, GetRequest, GetResult,
    HybridSearchRequest, Include, KnnClause, Metadata, QueryRequest, QueryResult, Rank, Record,
};
use seekdb_core::store::CollectionStore;

use crate::config::{Config, DbMode, EmbeddingConfig};
use crate::embedding::{create_provider, embed_query, EmbeddingProvider};
use crate::server_store::ServerStore;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

type ProviderSlot = Arc<OnceCell<Arc<dyn EmbeddingProvider>>>;

/// Entry point for collection operations.
pub struct Client {
    store: Arc<dyn CollectionStore>,
    embedding: Arc<EmbeddingConfig>,
    provider: ProviderSlot,
    placeholder_dims: usize,
}

impl Client {
    /// Connect to the backend selected by `db.mode`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store: Arc<dyn CollectionStore> = match config.db.mode {
            DbMode::Server => {
                let pool = db::connect_server(&config.db).await?;
                tracing::debug!(host = ?config.db.host, port = config.db.port, "Connected to seekdb server");
                Arc::new(ServerStore::new(pool))
            }
            DbMode::Embedded => {
                let path = config.db_path();
                let pool = db::connect_sqlite(&path).await?;
                migrate::run_migrations(&pool).await?;
                tracing::debug!(path = %path.display(), "Opened embedded seekdb");
                Arc::new(SqliteStore::new(pool))
            }
        };
        Ok(Self {
            store,
            embedding: Arc::new(config.embedding.clone()),
            provider: Arc::new(OnceCell::new()),
            placeholder_dims: config.import.placeholder_dims,
        })
    }

    /// Build a client over an existing store, optionally with a ready
    /// embedding provider.
    pub fn with_store(
        store: Arc<dyn CollectionStore>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        placeholder_dims: usize,
    ) -> Self {
        Self {
            store,
            embedding: Arc::new(EmbeddingConfig::default()),
            provider: Arc::new(OnceCell::new_with(provider)),
            placeholder_dims,
        }
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.store.list_collections().await
    }

    pub async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.store.get_collection(name).await?.is_some())
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.store.delete_collection(name).await
    }

    /// Open an existing collection.
    pub async fn get_collection(&self, name: &str) -> Result<Collection> {
        match self.store.get_collection(name).await? {
            Some(info) => Ok(self.collection(info)),
            None => {
                let available: Vec<String> = self
                    .list_collections()
                    .await?
                    .into_iter()
                    .map(|c| c.name)
                    .collect();
                bail!(
                    "Collection '{}' not found. Available collections: {:?}",
                    name,
                    available
                )
            }
        }
    }

    /// Open a collection, creating it when missing.
    ///
    /// A new collection with an embedding function takes its dimension
    /// from the provider; without one it uses the placeholder dimension.
    pub async fn get_or_create_collection(
        &self,
        name: &str,
        with_embedding: bool,
    ) -> Result<Collection> {
        validate_collection_name(name)?;
        if let Some(info) = self.store.get_collection(name).await? {
            return Ok(self.collection(info));
        }

        let info = if with_embedding {
            let provider = self.provider().await?;
            CollectionInfo {
                name: name.to_string(),
                dimension: provider.dims(),
                distance: Default::default(),
                embedding_model: Some(provider.model_name().to_string()),
            }
        } else {
            CollectionInfo {
                name: name.to_string(),
                dimension: self.placeholder_dims,
                distance: Default::default(),
                embedding_model: None,
            }
        };
        self.store.create_collection(&info).await?;
        tracing::info!(collection = name, dimension = info.dimension, "Created collection");
        Ok(self.collection(info))
    }

    async fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        resolve_provider(&self.provider, &self.embedding).await
    }

    fn collection(&self, info: CollectionInfo) -> Collection {
        Collection {
            info,
            store: Arc::clone(&self.store),
            embedding: Arc::clone(&self.embedding),
            provider: Arc::clone(&self.provider),
        }
    }
}

async fn resolve_provider(
    slot: &ProviderSlot,
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    if !config.is_enabled() && !slot.initialized() {
        bail!("Embedding provider is disabled; set [embedding] provider in the config");
    }
    slot.get_or_try_init(|| async { create_provider(config) })
        .await
        .cloned()
}

/// Vector leg of a text hybrid search, before the query text is embedded.
#[derive(Debug, Clone)]
pub struct KnnQuery {
    pub query_text: String,
    pub filter: Option<Filter>,
    pub n_results: usize,
}

/// Handle to a single collection.
pub struct Collection {
    info: CollectionInfo,
    store: Arc<dyn CollectionStore>,
    embedding: Arc<EmbeddingConfig>,
    provider: ProviderSlot,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    /// The provider used for this collection's documents and query texts.
    async fn embedding_function(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let Some(model) = self.info.embedding_model.as_deref() else {
            bail!(
                "Collection '{}' has no embedding function. Re-import with --vectorize-column to enable semantic and hybrid search.",
                self.info.name
            );
        };
        let provider = resolve_provider(&self.provider, &self.embedding).await?;
        if provider.dims() != self.info.dimension {
            bail!(
                "Embedding model '{}' produces {} dimensions but collection '{}' has {} (created with '{}')",
                provider.model_name(),
                provider.dims(),
                self.info.name,
                self.info.dimension,
                model
            );
        }
        if provider.model_name() != model {
            tracing::warn!(
                collection = %self.info.name,
                stored = model,
                configured = provider.model_name(),
                "Configured embedding model differs from the collection's"
            );
        }
        Ok(provider)
    }

    /// Insert records. Documents are embedded when `embeddings` is `None`.
    pub async fn add(
        &self,
        ids: Vec<String>,
        documents: Option<Vec<String>>,
        metadatas: Vec<Metadata>,
        embeddings: Option<Vec<Vec<f32>>>,
    ) -> Result<()> {
        let n = ids.len();
        if let Some(docs) = &documents {
            if docs.len() != n {
                bail!("Got {} ids but {} documents", n, docs.len());
            }
        }
        if !metadatas.is_empty() && metadatas.len() != n {
            bail!("Got {} ids but {} metadatas", n, metadatas.len());
        }
        if let Some(embs) = &embeddings {
            if embs.len() != n {
                bail!("Got {} ids but {} embeddings", n, embs.len());
            }
        }

        let embeddings = match (embeddings, &documents) {
            (Some(embs), _) => embs,
            (None, Some(docs)) => {
                let provider = self.embedding_function().await?;
                let embs = provider.embed(docs).await?;
                if embs.len() != n {
                    bail!("Embedding provider returned {} vectors for {} documents", embs.len(), n);
                }
                embs
            }
            (None, None) => bail!(
                "Collection '{}' needs documents or embeddings for every record",
                self.info.name
            ),
        };

        let mut documents = documents.map(|d| d.into_iter());
        let mut metadatas = metadatas.into_iter();
        let records: Vec<Record> = ids
            .into_iter()
            .zip(embeddings)
            .map(|(id, embedding)| Record {
                id,
                document: documents.as_mut().and_then(|d| d.next()),
                metadata: metadatas.next().unwrap_or_default(),
                embedding,
            })
            .collect();

        self.store.add(&self.info.name, &records).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(&self.info.name).await
    }

    pub async fn peek(&self, limit: usize) -> Result<GetResult> {
        self.store.peek(&self.info.name, limit).await
    }

    pub async fn get(&self, req: &GetRequest) -> Result<GetResult> {
        self.store.get(&self.info.name, req).await
    }

    /// Nearest-neighbour search for each query text.
    pub async fn query(
        &self,
        query_texts: &[String],
        n_results: usize,
        filter: Option<Filter>,
        document_filter: Option<DocumentFilter>,
        include: Include,
    ) -> Result<QueryResult> {
        let provider = self.embedding_function().await?;
        let query_embeddings = provider.embed(query_texts).await?;
        let req = QueryRequest {
            query_embeddings,
            n_results,
            filter,
            document_filter,
            include,
        };
        self.store.query(&self.info.name, &req).await
    }

    /// Full-text plus kNN search fused with reciprocal rank fusion.
    pub async fn hybrid_search(
        &self,
        query: FullTextClause,
        knn: KnnQuery,
        n_results: usize,
        include: Include,
    ) -> Result<QueryResult> {
        let provider = self.embedding_function().await?;
        let query_embedding = embed_query(provider.as_ref(), &knn.query_text).await?;
        let req = HybridSearchRequest {
            query,
            knn: KnnClause {
                query_text: knn.query_text,
                query_embedding,
                filter: knn.filter,
                n_results: knn.n_results,
            },
            rank: Rank::Rrf,
            n_results,
            include,
        };
        self.store.hybrid_search(&self.info.name, &req).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use seekdb_core::store::memory::InMemoryStore;
    use serde_json::json;

    /// Deterministic bag-of-words embedding over a tiny vocabulary.
    pub(crate) struct WordsProvider;

    const VOCAB: [&str; 4] = ["battery", "camera", "screen", "cheap"];

    #[async_trait]
    impl EmbeddingProvider for WordsProvider {
        fn model_name(&self) -> &str {
            "words"
        }
        fn dims(&self) -> usize {
            VOCAB.len()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|w| if lower.contains(w) { 1.0 } else { 0.01 })
                        .collect()
                })
                .collect())
        }
    }

    pub(crate) fn client() -> Client {
        Client::with_store(Arc::new(InMemoryStore::new()), Some(Arc::new(WordsProvider)), 3)
    }

    fn meta(v: serde_json::Value) -> Metadata {
        v.as_object().cloned().unwrap()
    }

    async fn phones(client: &Client) -> Collection {
        let coll = client.get_or_create_collection("phones", true).await.unwrap();
        coll.add(
            vec!["a".into(), "b".into(), "c".into()],
            Some(vec![
                "cheap phone with battery".into(),
                "great camera".into(),
                "big screen battery".into(),
            ]),
            vec![
                meta(json!({"brand": "REDMI"})),
                meta(json!({"brand": "SAMSUNG"})),
                meta(json!({"brand": "SAMSUNG"})),
            ],
            None,
        )
        .await
        .unwrap();
        coll
    }

    #[tokio::test]
    async fn test_missing_collection_lists_available() {
        let client = client();
        phones(&client).await;
        let err = client.get_collection("tablets").await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "Collection 'tablets' not found. Available collections: [\"phones\"]"
        );
    }

    #[tokio::test]
    async fn test_dimensions_follow_embedding_choice() {
        let client = client();
        let with = client.get_or_create_collection("with", true).await.unwrap();
        let without = client.get_or_create_collection("without", false).await.unwrap();
        assert_eq!(with.info().dimension, 4);
        assert_eq!(with.info().embedding_model.as_deref(), Some("words"));
        assert_eq!(without.info().dimension, 3);
        assert!(!without.info().has_embedding_function());
        assert!(client.has_collection("without").await.unwrap());
    }

    #[tokio::test]
    async fn test_semantic_query() {
        let client = client();
        let coll = phones(&client).await;
        let result = coll
            .query(&["camera".to_string()], 1, None, None, Include::default())
            .await
            .unwrap();
        assert_eq!(result.ids[0], vec!["b"]);
        assert!(result.distances.is_some());
    }

    #[tokio::test]
    async fn test_hybrid_search_restricted_by_where() {
        let client = client();
        let coll = phones(&client).await;
        let samsung = Filter::parse(&json!({"brand": "SAMSUNG"})).unwrap();
        let result = coll
            .hybrid_search(
                FullTextClause {
                    document_filter: Some(DocumentFilter::contains("battery")),
                    filter: Some(samsung.clone()),
                    n_results: 10,
                },
                KnnQuery {
                    query_text: "battery".into(),
                    filter: Some(samsung),
                    n_results: 10,
                },
                5,
                Include::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.ids[0][0], "c");
        assert!(!result.ids[0].contains(&"a".to_string()));
        assert!(result.distances.is_none());
    }

    #[tokio::test]
    async fn test_semantic_query_requires_embedding_function() {
        let client = client();
        let coll = client.get_or_create_collection("plain", false).await.unwrap();
        coll.add(
            vec!["x".into()],
            None,
            vec![meta(json!({"k": 1}))],
            Some(vec![vec![0.1, 0.2, 0.3]]),
        )
        .await
        .unwrap();
        let err = coll
            .query(&["anything".to_string()], 3, None, None, Include::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--vectorize-column"));
    }

    #[tokio::test]
    async fn test_add_rejects_mismatched_lengths() {
        let client = client();
        let coll = client.get_or_create_collection("c", true).await.unwrap();
        let err = coll
            .add(vec!["a".into(), "b".into()], Some(vec!["one".into()]), vec![], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2 ids but 1 documents"));
    }

    #[tokio::test]
    async fn test_invalid_collection_name() {
        assert!(client().get_or_create_collection("bad name", false).await.is_err());
    }
}
