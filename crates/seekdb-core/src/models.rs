//! Core data models shared by every store backend.
//!
//! The result shapes mirror the collection API exposed by seekdb: `get`
//! returns flat lists aligned with `ids`, while `query` and
//! `hybrid_search` return one inner list per query.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::DistanceMetric;
use crate::filter::{DocumentFilter, Filter};

/// Metadata attached to a record. Keys keep their insertion order.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Dimension used for collections created without an embedding function.
pub const PLACEHOLDER_DIMENSION: usize = 384;

/// A single stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub document: Option<String>,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// Description of a collection as persisted by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    #[serde(default)]
    pub distance: DistanceMetric,
    /// Embedding model used for documents and query texts, if any.
    #[serde(default)]
    pub embedding_model: Option<String>,
}

impl CollectionInfo {
    pub fn has_embedding_function(&self) -> bool {
        self.embedding_model.is_some()
    }
}

/// Validate a collection name.
///
/// Names become table names on the server backend, so only ASCII
/// letters, digits, and underscores are accepted.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        bail!("Collection name must be 1-64 characters: '{}'", name);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!(
            "Collection name '{}' may only contain letters, digits, and underscores",
            name
        );
    }
    Ok(())
}

/// A field that can be requested in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeField {
    Documents,
    Metadatas,
    Embeddings,
    Distances,
}

/// The set of fields to return from `get`, `query`, and `hybrid_search`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    fields: Vec<IncludeField>,
}

impl Include {
    pub fn new(fields: Vec<IncludeField>) -> Self {
        Self { fields }
    }

    /// Parse a comma-separated list such as `documents,metadatas`.
    pub fn parse(list: &str) -> Result<Self> {
        let mut fields = Vec::new();
        for raw in list.split(',') {
            let field = match raw.trim() {
                "" => continue,
                "documents" => IncludeField::Documents,
                "metadatas" => IncludeField::Metadatas,
                "embeddings" => IncludeField::Embeddings,
                "distances" => IncludeField::Distances,
                other => bail!(
                    "Unknown include field: '{}'. Use documents, metadatas, embeddings, or distances.",
                    other
                ),
            };
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(Self { fields })
    }

    pub fn contains(&self, field: IncludeField) -> bool {
        self.fields.contains(&field)
    }

    pub fn documents(&self) -> bool {
        self.contains(IncludeField::Documents)
    }

    pub fn metadatas(&self) -> bool {
        self.contains(IncludeField::Metadatas)
    }

    pub fn embeddings(&self) -> bool {
        self.contains(IncludeField::Embeddings)
    }
}

impl Default for Include {
    fn default() -> Self {
        Self {
            fields: vec![IncludeField::Documents, IncludeField::Metadatas],
        }
    }
}

/// Flat result of `get` and `peek`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GetResult {
    pub ids: Vec<String>,
    pub documents: Option<Vec<Option<String>>>,
    pub metadatas: Option<Vec<Option<Metadata>>>,
    pub embeddings: Option<Vec<Vec<f32>>>,
}

impl GetResult {
    /// Build a result from records, keeping only the included fields.
    pub fn from_records<'a, I>(records: I, include: &Include) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut out = GetResult {
            ids: Vec::new(),
            documents: include.documents().then(Vec::new),
            metadatas: include.metadatas().then(Vec::new),
            embeddings: include.embeddings().then(Vec::new),
        };
        for record in records {
            out.ids.push(record.id.clone());
            if let Some(docs) = out.documents.as_mut() {
                docs.push(record.document.clone());
            }
            if let Some(metas) = out.metadatas.as_mut() {
                metas.push(non_empty(&record.metadata));
            }
            if let Some(embs) = out.embeddings.as_mut() {
                embs.push(record.embedding.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Wrap the flat lists into the nested query shape (one query).
    ///
    /// `get` has no notion of distance, so `distances` is always `None`.
    pub fn into_query_result(self) -> QueryResult {
        QueryResult {
            ids: vec![self.ids],
            documents: self.documents.filter(|d| !d.is_empty()).map(|d| vec![d]),
            metadatas: self.metadatas.filter(|m| !m.is_empty()).map(|m| vec![m]),
            embeddings: self.embeddings.filter(|e| !e.is_empty()).map(|e| vec![e]),
            distances: None,
        }
    }
}

/// Nested result of `query` and `hybrid_search`: one inner list per query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub documents: Option<Vec<Vec<Option<String>>>>,
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    pub embeddings: Option<Vec<Vec<Vec<f32>>>>,
    pub distances: Option<Vec<Vec<f64>>>,
}

impl QueryResult {
    /// Empty result with the included field lists initialised.
    pub fn empty(include: &Include, with_distances: bool) -> Self {
        QueryResult {
            ids: Vec::new(),
            documents: include.documents().then(Vec::new),
            metadatas: include.metadatas().then(Vec::new),
            embeddings: include.embeddings().then(Vec::new),
            distances: with_distances.then(Vec::new),
        }
    }

    /// Append one query's hits. `distances` is ignored when the result
    /// was created without distances.
    pub fn push_query<'a, I>(&mut self, hits: I)
    where
        I: IntoIterator<Item = (&'a Record, Option<f64>)>,
    {
        let mut ids = Vec::new();
        let mut docs = Vec::new();
        let mut metas = Vec::new();
        let mut embs = Vec::new();
        let mut dists = Vec::new();
        for (record, distance) in hits {
            ids.push(record.id.clone());
            docs.push(record.document.clone());
            metas.push(non_empty(&record.metadata));
            embs.push(record.embedding.clone());
            dists.push(distance.unwrap_or(0.0));
        }
        self.ids.push(ids);
        if let Some(d) = self.documents.as_mut() {
            d.push(docs);
        }
        if let Some(m) = self.metadatas.as_mut() {
            m.push(metas);
        }
        if let Some(e) = self.embeddings.as_mut() {
            e.push(embs);
        }
        if let Some(d) = self.distances.as_mut() {
            d.push(dists);
        }
    }

    /// True when there is no first query or it returned no ids.
    pub fn is_empty(&self) -> bool {
        self.ids.first().map_or(true, |ids| ids.is_empty())
    }

    /// Number of hits for the first query.
    pub fn len(&self) -> usize {
        self.ids.first().map_or(0, |ids| ids.len())
    }
}

fn non_empty(metadata: &Metadata) -> Option<Metadata> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata.clone())
    }
}

/// Parameters for `get`.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub document_filter: Option<DocumentFilter>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub include: Include,
}

/// Parameters for `query` once query texts have been embedded.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query_embeddings: Vec<Vec<f32>>,
    pub n_results: usize,
    pub filter: Option<Filter>,
    pub document_filter: Option<DocumentFilter>,
    pub include: Include,
}

/// Full-text leg of a hybrid search.
#[derive(Debug, Clone, Default)]
pub struct FullTextClause {
    pub document_filter: Option<DocumentFilter>,
    pub filter: Option<Filter>,
    pub n_results: usize,
}

/// Vector leg of a hybrid search.
#[derive(Debug, Clone)]
pub struct KnnClause {
    pub query_text: String,
    pub query_embedding: Vec<f32>,
    pub filter: Option<Filter>,
    pub n_results: usize,
}

/// Rank fusion strategy for hybrid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rank {
    /// Reciprocal rank fusion, `score = Σ 1 / (k + rank)`.
    #[default]
    Rrf,
}

/// Parameters for `hybrid_search`.
#[derive(Debug, Clone)]
pub struct HybridSearchRequest {
    pub query: FullTextClause,
    pub knn: KnnClause,
    pub rank: Rank,
    pub n_results: usize,
    pub include: Include,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, doc: Option<&str>, meta: serde_json::Value) -> Record {
        Record {
            id: id.to_string(),
            document: doc.map(str::to_string),
            metadata: meta.as_object().cloned().unwrap_or_default(),
            embedding: vec![0.0, 1.0],
        }
    }

    #[test]
    fn test_include_parse_trims_and_dedups() {
        let include = Include::parse(" documents, metadatas ,documents").unwrap();
        assert!(include.documents());
        assert!(include.metadatas());
        assert!(!include.embeddings());
    }

    #[test]
    fn test_include_parse_rejects_unknown() {
        let err = Include::parse("documents,vectors").unwrap_err();
        assert!(err.to_string().contains("vectors"));
    }

    #[test]
    fn test_collection_name_validation() {
        assert!(validate_collection_name("mobiles_2024").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("bad-name").is_err());
        assert!(validate_collection_name("drop table").is_err());
    }

    #[test]
    fn test_get_result_respects_include() {
        let records = vec![record("a", Some("doc"), json!({"k": 1}))];
        let include = Include::parse("metadatas").unwrap();
        let result = GetResult::from_records(&records, &include);
        assert_eq!(result.ids, vec!["a"]);
        assert!(result.documents.is_none());
        assert_eq!(result.metadatas.unwrap()[0].as_ref().unwrap()["k"], json!(1));
    }

    #[test]
    fn test_into_query_result_nests_lists() {
        let records = vec![
            record("a", Some("first"), json!({"k": 1})),
            record("b", None, json!({})),
        ];
        let nested = GetResult::from_records(&records, &Include::default()).into_query_result();
        assert_eq!(nested.ids, vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(nested.documents.as_ref().unwrap()[0][1], None);
        assert_eq!(nested.metadatas.as_ref().unwrap()[0][1], None);
        assert!(nested.distances.is_none());
        assert_eq!(nested.len(), 2);
    }

    #[test]
    fn test_empty_get_converts_without_optional_lists() {
        let nested = GetResult::from_records(&[], &Include::default()).into_query_result();
        assert!(nested.is_empty());
        assert!(nested.documents.is_none());
        assert!(nested.metadatas.is_none());
    }
}
