//! Local evaluation of `get`, `query`, and `hybrid_search`.
//!
//! Used by the embedded and in-memory stores, which hold records in
//! insertion order and evaluate filters in process. The server backend
//! pushes all of this down to seekdb instead.
//!
//! # Hybrid Ranking
//!
//! 1. Full-text leg: records passing the leg's metadata filter and
//!    document filter, ranked by the number of positive terms they
//!    contain (descending), truncated to the leg's `n_results`.
//! 2. kNN leg: records passing the leg's metadata filter, ranked by
//!    distance (ascending), truncated to the leg's `n_results`.
//! 3. Fusion: `score(d) = Σ 1 / (RRF_K + rank_leg(d))` with 1-based ranks.
//! 4. Sort by score (desc), then insertion order, truncate to `n_results`.
//!
//! Every sort is stable, so ties keep insertion order.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::embedding::DistanceMetric;
use crate::filter::{DocumentFilter, Filter};
use crate::models::{GetRequest, GetResult, HybridSearchRequest, QueryRequest, QueryResult, Record};

/// Reciprocal rank fusion constant.
pub const RRF_K: f64 = 60.0;

fn passes(record: &Record, filter: Option<&Filter>, document_filter: Option<&DocumentFilter>) -> bool {
    filter.map_or(true, |f| f.matches(&record.metadata))
        && document_filter.map_or(true, |f| f.matches(record.document.as_deref()))
}

/// Evaluate a `get` request. Records come back in insertion order.
pub fn get(records: &[Record], req: &GetRequest) -> GetResult {
    let selected = records
        .iter()
        .filter(|r| {
            req.ids
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| id == &r.id))
        })
        .filter(|r| passes(r, req.filter.as_ref(), req.document_filter.as_ref()))
        .skip(req.offset)
        .take(req.limit.unwrap_or(usize::MAX));
    GetResult::from_records(selected, &req.include)
}

/// Indices of the `n` nearest records to `query`, with their distances.
pub fn nearest(
    records: &[Record],
    metric: DistanceMetric,
    query: &[f32],
    n: usize,
    filter: Option<&Filter>,
    document_filter: Option<&DocumentFilter>,
) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| passes(r, filter, document_filter))
        .map(|(i, r)| (i, metric.distance(query, &r.embedding)))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    scored.truncate(n);
    scored
}

/// Evaluate a `query` request: one nearest-neighbour list per query
/// embedding, ascending distance.
pub fn query(records: &[Record], metric: DistanceMetric, req: &QueryRequest) -> QueryResult {
    let mut result = QueryResult::empty(&req.include, true);
    for embedding in &req.query_embeddings {
        let hits = nearest(
            records,
            metric,
            embedding,
            req.n_results,
            req.filter.as_ref(),
            req.document_filter.as_ref(),
        );
        result.push_query(hits.into_iter().map(|(i, d)| (&records[i], Some(d))));
    }
    result
}

/// Indices of full-text matches, best first.
pub fn fulltext(
    records: &[Record],
    n: usize,
    filter: Option<&Filter>,
    document_filter: Option<&DocumentFilter>,
) -> Vec<usize> {
    let terms = document_filter.map(|f| f.positive_terms()).unwrap_or_default();
    let mut scored: Vec<(usize, usize)> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| passes(r, filter, document_filter))
        .map(|(i, r)| (i, term_hits(r.document.as_deref(), &terms)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().take(n).map(|(i, _)| i).collect()
}

fn term_hits(document: Option<&str>, terms: &[String]) -> usize {
    let Some(doc) = document else { return 0 };
    let doc = doc.to_lowercase();
    terms.iter().map(|t| doc.matches(t.as_str()).count()).sum()
}

/// Fuse ranked lists of record indices with reciprocal rank fusion.
///
/// Returns `(index, score)` pairs sorted by score descending, ties
/// broken by index (insertion order).
pub fn rrf_fuse(legs: &[Vec<usize>]) -> Vec<(usize, f64)> {
    let mut scores: HashMap<usize, f64> = HashMap::new();
    for leg in legs {
        for (rank, idx) in leg.iter().enumerate() {
            *scores.entry(*idx).or_insert(0.0) += 1.0 / (RRF_K + (rank + 1) as f64);
        }
    }
    let mut fused: Vec<(usize, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    fused
}

/// Evaluate a `hybrid_search` request. The result carries no distances:
/// fused scores are not distances.
pub fn hybrid(records: &[Record], metric: DistanceMetric, req: &HybridSearchRequest) -> QueryResult {
    let text_leg = fulltext(
        records,
        req.query.n_results,
        req.query.filter.as_ref(),
        req.query.document_filter.as_ref(),
    );
    let knn_leg: Vec<usize> = nearest(
        records,
        metric,
        &req.knn.query_embedding,
        req.knn.n_results,
        req.knn.filter.as_ref(),
        None,
    )
    .into_iter()
    .map(|(i, _)| i)
    .collect();

    let fused = rrf_fuse(&[text_leg, knn_leg]);
    let mut result = QueryResult::empty(&req.include, false);
    result.push_query(
        fused
            .into_iter()
            .take(req.n_results)
            .map(|(i, _)| (&records[i], None)),
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FullTextClause, Include, KnnClause, Rank};
    use serde_json::json;

    fn record(id: &str, doc: &str, meta: serde_json::Value, embedding: Vec<f32>) -> Record {
        Record {
            id: id.to_string(),
            document: Some(doc.to_string()),
            metadata: meta.as_object().cloned().unwrap_or_default(),
            embedding,
        }
    }

    fn phones() -> Vec<Record> {
        vec![
            record("p1", "budget phone with big battery", json!({"brand": "REDMI", "price": 900}), vec![1.0, 0.0]),
            record("p2", "flagship phone great camera", json!({"brand": "SAMSUNG", "price": 5000}), vec![0.0, 1.0]),
            record("p3", "battery battery phone", json!({"brand": "SAMSUNG", "price": 1500}), vec![0.7, 0.7]),
            record("p4", "tablet", json!({"brand": "REDMI", "price": 1200}), vec![0.9, 0.1]),
        ]
    }

    #[test]
    fn test_get_filters_and_paginates_in_insertion_order() {
        let records = phones();
        let req = GetRequest {
            filter: Some(Filter::parse(&json!({"brand": "REDMI"})).unwrap()),
            ..Default::default()
        };
        assert_eq!(get(&records, &req).ids, vec!["p1", "p4"]);

        let page = GetRequest {
            limit: Some(2),
            offset: 1,
            ..Default::default()
        };
        assert_eq!(get(&records, &page).ids, vec!["p2", "p3"]);
    }

    #[test]
    fn test_get_by_ids_keeps_storage_order() {
        let req = GetRequest {
            ids: Some(vec!["p3".into(), "p1".into(), "missing".into()]),
            ..Default::default()
        };
        assert_eq!(get(&phones(), &req).ids, vec!["p1", "p3"]);
    }

    #[test]
    fn test_query_orders_by_distance() {
        let records = phones();
        let req = QueryRequest {
            query_embeddings: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            n_results: 2,
            filter: None,
            document_filter: None,
            include: Include::default(),
        };
        let result = query(&records, DistanceMetric::Cosine, &req);
        assert_eq!(result.ids[0], vec!["p1", "p4"]);
        assert_eq!(result.ids[1][0], "p2");
        let distances = result.distances.unwrap();
        assert!(distances[0][0] <= distances[0][1]);
    }

    #[test]
    fn test_query_applies_document_filter() {
        let req = QueryRequest {
            query_embeddings: vec![vec![1.0, 0.0]],
            n_results: 5,
            filter: None,
            document_filter: Some(DocumentFilter::contains("camera")),
            include: Include::default(),
        };
        let result = query(&phones(), DistanceMetric::L2, &req);
        assert_eq!(result.ids[0], vec!["p2"]);
    }

    #[test]
    fn test_fulltext_ranks_by_term_hits() {
        let records = phones();
        let ranked = fulltext(&records, 10, None, Some(&DocumentFilter::contains("battery")));
        assert_eq!(ranked, vec![2, 0]);
    }

    #[test]
    fn test_rrf_fuse_rewards_agreement() {
        let fused = rrf_fuse(&[vec![0, 1, 2], vec![2, 0]]);
        assert_eq!(fused[0].0, 0);
        assert_eq!(fused[1].0, 2);
        assert_eq!(fused[2].0, 1);
        assert!((fused[0].1 - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_ties_keep_insertion_order() {
        let fused = rrf_fuse(&[vec![3], vec![1]]);
        assert_eq!(fused.iter().map(|f| f.0).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_hybrid_fuses_both_legs_without_distances() {
        let records = phones();
        let req = HybridSearchRequest {
            query: FullTextClause {
                document_filter: Some(DocumentFilter::contains("battery")),
                filter: None,
                n_results: 4,
            },
            knn: KnnClause {
                query_text: "battery".into(),
                query_embedding: vec![0.7, 0.7],
                filter: None,
                n_results: 4,
            },
            rank: Rank::Rrf,
            n_results: 2,
            include: Include::default(),
        };
        let result = hybrid(&records, DistanceMetric::Cosine, &req);
        assert_eq!(result.ids[0][0], "p3");
        assert_eq!(result.len(), 2);
        assert!(result.distances.is_none());
    }

    #[test]
    fn test_hybrid_where_restricts_both_legs() {
        let records = phones();
        let samsung = Filter::parse(&json!({"brand": "SAMSUNG"})).unwrap();
        let req = HybridSearchRequest {
            query: FullTextClause {
                document_filter: Some(DocumentFilter::contains("phone")),
                filter: Some(samsung.clone()),
                n_results: 10,
            },
            knn: KnnClause {
                query_text: "phone".into(),
                query_embedding: vec![1.0, 0.0],
                filter: Some(samsung),
                n_results: 10,
            },
            rank: Rank::Rrf,
            n_results: 10,
            include: Include::default(),
        };
        let result = hybrid(&records, DistanceMetric::Cosine, &req);
        let mut ids = result.ids[0].clone();
        ids.sort();
        assert_eq!(ids, vec!["p2", "p3"]);
    }
}
