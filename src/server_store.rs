//! seekdb server [`CollectionStore`] over the MySQL protocol.
//!
//! Each collection is one table named `c$v1$<name>`:
//!
//! | Column | Type | Notes |
//! |--------|------|-------|
//! | `_id` | `VARBINARY(512)` | primary key |
//! | `document` | `LONGTEXT` | full-text index (`ik` parser) |
//! | `embedding` | `VECTOR(dim)` | HNSW vector index with the collection metric |
//! | `metadata` | `JSON` | |
//!
//! Collection settings (dimension, metric, embedding model) are stored
//! as JSON in the table comment. Filters become SQL with bound
//! parameters; kNN uses `<metric>_distance(...) APPROXIMATE LIMIT n`;
//! hybrid search hands a search-parameter document with
//! `rank: {"rrf": {}}` to `DBMS_HYBRID_SEARCH.GET_SQL` and runs the SQL
//! it returns, so rank fusion happens inside the database.
//!
//! The SQL and JSON builders are pure functions so they can be tested
//! without a server.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, MySql, MySqlPool, Row};

use seekdb_core::embedding::{parse_vector_literal, vector_literal, DistanceMetric};
use seekdb_core::filter::{Comparison, DocumentFilter, Filter};
use seekdb_core::models::{
    CollectionInfo, GetRequest, GetResult, HybridSearchRequest, Include, Metadata, QueryRequest,
    QueryResult, Record,
};
use seekdb_core::store::{missing_collection, validate_batch, CollectionStore};

/// Prefix of collection tables.
pub const TABLE_PREFIX: &str = "c$v1$";

pub fn table_name(collection: &str) -> String {
    format!("{}{}", TABLE_PREFIX, collection)
}

fn quoted_table(collection: &str) -> String {
    format!("`{}`", table_name(collection))
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Str(String),
    Int(i64),
    Float(f64),
}

/// SQL text with its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    fn join(parts: Vec<SqlFragment>, sep: &str) -> Self {
        let mut sql = Vec::with_capacity(parts.len());
        let mut params = Vec::new();
        for part in parts {
            sql.push(format!("({})", part.sql));
            params.extend(part.params);
        }
        Self {
            sql: sql.join(sep),
            params,
        }
    }

    fn bind(&self) -> Query<'_, MySql, MySqlArguments> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = match param {
                SqlParam::Str(s) => query.bind(s.clone()),
                SqlParam::Int(i) => query.bind(*i),
                SqlParam::Float(f) => query.bind(*f),
            };
        }
        query
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TableComment {
    dimension: usize,
    #[serde(default)]
    distance: DistanceMetric,
    #[serde(default)]
    embedding_model: Option<String>,
}

fn escape_sql_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

/// `CREATE TABLE` statement for a collection.
pub fn create_table_sql(info: &CollectionInfo) -> Result<String> {
    let comment = serde_json::to_string(&TableComment {
        dimension: info.dimension,
        distance: info.distance,
        embedding_model: info.embedding_model.clone(),
    })?;
    Ok(format!(
        "CREATE TABLE {table} (\n  \
           _id VARBINARY(512) PRIMARY KEY NOT NULL,\n  \
           document LONGTEXT,\n  \
           embedding VECTOR({dim}),\n  \
           metadata JSON,\n  \
           FULLTEXT INDEX idx_fts (document) WITH PARSER ik,\n  \
           VECTOR INDEX idx_vec (embedding) WITH (distance={metric}, type=hnsw, lib=vsag)\n\
         ) ORGANIZATION = HEAP COMMENT = '{comment}'",
        table = quoted_table(&info.name),
        dim = info.dimension,
        metric = info.distance.as_str(),
        comment = escape_sql_string(&comment),
    ))
}

/// Rebuild collection settings from a table name and its comment.
pub fn parse_table_comment(table: &str, comment: &str) -> Option<CollectionInfo> {
    let name = table.strip_prefix(TABLE_PREFIX)?;
    let parsed: TableComment = serde_json::from_str(comment).ok()?;
    Some(CollectionInfo {
        name: name.to_string(),
        dimension: parsed.dimension,
        distance: parsed.distance,
        embedding_model: parsed.embedding_model,
    })
}

fn distance_fn(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "cosine_distance",
        DistanceMetric::L2 => "l2_distance",
        DistanceMetric::InnerProduct => "negative_inner_product",
    }
}

/// JSON path for a metadata key, e.g. `$."Brand"`.
pub fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
}

fn extract(path: &str) -> (String, SqlParam) {
    (
        "JSON_EXTRACT(metadata, ?)".to_string(),
        SqlParam::Str(path.to_string()),
    )
}

fn eq_sql(path: &str, value: &Value) -> SqlFragment {
    let (expr, path_param) = extract(path);
    match value {
        Value::String(s) => SqlFragment::new(
            format!("JSON_UNQUOTE({}) = ?", expr),
            vec![path_param, SqlParam::Str(s.clone())],
        ),
        Value::Number(n) => SqlFragment::new(format!("{} = ?", expr), vec![path_param, number_param(n)]),
        Value::Bool(b) => SqlFragment::new(
            format!("{} = CAST(? AS JSON)", expr),
            vec![path_param, SqlParam::Str(b.to_string())],
        ),
        _ => SqlFragment::new(format!("JSON_TYPE({}) = 'NULL'", expr), vec![path_param]),
    }
}

fn number_param(n: &serde_json::Number) -> SqlParam {
    match n.as_i64() {
        Some(i) => SqlParam::Int(i),
        None => SqlParam::Float(n.as_f64().unwrap_or(0.0)),
    }
}

fn ordering_sql(path: &str, op: &str, value: &Value) -> SqlFragment {
    let (expr, path_param) = extract(path);
    match value {
        Value::String(s) => SqlFragment::new(
            format!("JSON_UNQUOTE({}) {} ?", expr, op),
            vec![path_param, SqlParam::Str(s.clone())],
        ),
        Value::Number(n) => SqlFragment::new(
            format!("{} {} ?", expr, op),
            vec![path_param, number_param(n)],
        ),
        // ordering across other types never matches
        _ => SqlFragment::new("1 = 0", Vec::new()),
    }
}

fn any_of_sql(path: &str, values: &[Value]) -> SqlFragment {
    if values.is_empty() {
        return SqlFragment::new("1 = 0", Vec::new());
    }
    SqlFragment::join(values.iter().map(|v| eq_sql(path, v)).collect(), " OR ")
}

fn negate_sql(path: &str, inner: SqlFragment) -> SqlFragment {
    let (expr, path_param) = extract(path);
    let mut params = vec![path_param];
    params.extend(inner.params);
    SqlFragment::new(format!("{} IS NULL OR NOT ({})", expr, inner.sql), params)
}

/// Translate a metadata filter into a SQL condition.
pub fn filter_sql(filter: &Filter) -> SqlFragment {
    match filter {
        Filter::And(fs) => SqlFragment::join(fs.iter().map(filter_sql).collect(), " AND "),
        Filter::Or(fs) => SqlFragment::join(fs.iter().map(filter_sql).collect(), " OR "),
        Filter::Field { key, op } => {
            let path = json_path(key);
            match op {
                Comparison::Eq(v) => eq_sql(&path, v),
                Comparison::Ne(v) => negate_sql(&path, eq_sql(&path, v)),
                Comparison::Gt(v) => ordering_sql(&path, ">", v),
                Comparison::Gte(v) => ordering_sql(&path, ">=", v),
                Comparison::Lt(v) => ordering_sql(&path, "<", v),
                Comparison::Lte(v) => ordering_sql(&path, "<=", v),
                Comparison::In(vs) => any_of_sql(&path, vs),
                Comparison::Nin(vs) => negate_sql(&path, any_of_sql(&path, vs)),
            }
        }
    }
}

/// Translate a document filter into a full-text SQL condition.
pub fn document_filter_sql(filter: &DocumentFilter) -> SqlFragment {
    match filter {
        DocumentFilter::Contains(text) => SqlFragment::new(
            "MATCH(document) AGAINST (? IN NATURAL LANGUAGE MODE)",
            vec![SqlParam::Str(text.clone())],
        ),
        DocumentFilter::NotContains(text) => SqlFragment::new(
            "NOT MATCH(document) AGAINST (? IN NATURAL LANGUAGE MODE)",
            vec![SqlParam::Str(text.clone())],
        ),
        DocumentFilter::And(fs) => {
            SqlFragment::join(fs.iter().map(document_filter_sql).collect(), " AND ")
        }
        DocumentFilter::Or(fs) => {
            SqlFragment::join(fs.iter().map(document_filter_sql).collect(), " OR ")
        }
    }
}

fn where_clause(
    ids: Option<&[String]>,
    filter: Option<&Filter>,
    document_filter: Option<&DocumentFilter>,
) -> Option<SqlFragment> {
    let mut parts = Vec::new();
    if let Some(ids) = ids {
        parts.push(if ids.is_empty() {
            SqlFragment::new("1 = 0", Vec::new())
        } else {
            SqlFragment::new(
                format!("_id IN ({})", vec!["?"; ids.len()].join(", ")),
                ids.iter().map(|id| SqlParam::Str(id.clone())).collect(),
            )
        });
    }
    if let Some(f) = filter {
        parts.push(filter_sql(f));
    }
    if let Some(f) = document_filter {
        parts.push(document_filter_sql(f));
    }
    (!parts.is_empty()).then(|| SqlFragment::join(parts, " AND "))
}

fn select_columns(include: &Include) -> &'static str {
    if include.embeddings() {
        "_id, document, metadata, embedding"
    } else {
        "_id, document, metadata"
    }
}

/// `SELECT` statement for a `get` request.
pub fn get_sql(collection: &str, req: &GetRequest) -> SqlFragment {
    let mut sql = format!(
        "SELECT {} FROM {}",
        select_columns(&req.include),
        quoted_table(collection)
    );
    let mut params = Vec::new();
    if let Some(w) = where_clause(
        req.ids.as_deref(),
        req.filter.as_ref(),
        req.document_filter.as_ref(),
    ) {
        sql.push_str(" WHERE ");
        sql.push_str(&w.sql);
        params.extend(w.params);
    }
    if req.limit.is_some() || req.offset > 0 {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(SqlParam::Int(req.limit.map(|l| l as i64).unwrap_or(i64::MAX)));
        params.push(SqlParam::Int(req.offset as i64));
    }
    SqlFragment::new(sql, params)
}

/// Approximate nearest-neighbour statement for one query vector.
pub fn knn_sql(
    collection: &str,
    metric: DistanceMetric,
    query_embedding: &[f32],
    n_results: usize,
    filter: Option<&Filter>,
    document_filter: Option<&DocumentFilter>,
    include: &Include,
) -> SqlFragment {
    let func = distance_fn(metric);
    let literal = vector_literal(query_embedding);
    let mut sql = format!(
        "SELECT {}, {}(embedding, ?) AS _distance FROM {}",
        select_columns(include),
        func,
        quoted_table(collection)
    );
    let mut params = vec![SqlParam::Str(literal.clone())];
    if let Some(w) = where_clause(None, filter, document_filter) {
        sql.push_str(" WHERE ");
        sql.push_str(&w.sql);
        params.extend(w.params);
    }
    sql.push_str(&format!(" ORDER BY {}(embedding, ?) APPROXIMATE LIMIT ?", func));
    params.push(SqlParam::Str(literal));
    params.push(SqlParam::Int(n_results as i64));
    SqlFragment::new(sql, params)
}

fn filter_dsl(filter: &Filter) -> Value {
    match filter {
        Filter::And(fs) => json!({"bool": {"must": fs.iter().map(filter_dsl).collect::<Vec<_>>()}}),
        Filter::Or(fs) => json!({"bool": {"should": fs.iter().map(filter_dsl).collect::<Vec<_>>()}}),
        Filter::Field { key, op } => {
            let field = format!("metadata.{}", key);
            let range = |bound: &str, v: &Value| json!({"range": {field.clone(): {bound: v}}});
            match op {
                Comparison::Eq(v) => json!({"term": {field: v}}),
                Comparison::Ne(v) => json!({"bool": {"must_not": [{"term": {field: v}}]}}),
                Comparison::Gt(v) => range("gt", v),
                Comparison::Gte(v) => range("gte", v),
                Comparison::Lt(v) => range("lt", v),
                Comparison::Lte(v) => range("lte", v),
                Comparison::In(vs) => json!({"terms": {field: vs}}),
                Comparison::Nin(vs) => json!({"bool": {"must_not": [{"terms": {field: vs}}]}}),
            }
        }
    }
}

fn document_dsl(filter: &DocumentFilter) -> Value {
    match filter {
        DocumentFilter::Contains(text) => {
            json!({"query_string": {"fields": ["document"], "query": text}})
        }
        DocumentFilter::NotContains(text) => json!({"bool": {"must_not": [
            {"query_string": {"fields": ["document"], "query": text}}
        ]}}),
        DocumentFilter::And(fs) => {
            json!({"bool": {"must": fs.iter().map(document_dsl).collect::<Vec<_>>()}})
        }
        DocumentFilter::Or(fs) => {
            json!({"bool": {"should": fs.iter().map(document_dsl).collect::<Vec<_>>()}})
        }
    }
}

/// Search-parameter document for `DBMS_HYBRID_SEARCH`.
pub fn hybrid_search_params(req: &HybridSearchRequest) -> Value {
    let mut params = serde_json::Map::new();

    let text_filter: Vec<Value> = req.query.filter.iter().map(filter_dsl).collect();
    if let Some(doc) = &req.query.document_filter {
        let mut bool_query = json!({"must": [document_dsl(doc)]});
        if !text_filter.is_empty() {
            bool_query["filter"] = Value::Array(text_filter);
        }
        params.insert("query".into(), json!({"bool": bool_query}));
    } else if !text_filter.is_empty() {
        params.insert("query".into(), json!({"bool": {"filter": text_filter}}));
    }

    let mut knn = json!({
        "field": "embedding",
        "k": req.knn.n_results,
        "query_vector": req.knn.query_embedding,
    });
    if let Some(f) = &req.knn.filter {
        knn["filter"] = json!([filter_dsl(f)]);
    }
    params.insert("knn".into(), knn);

    params.insert("rank".into(), json!({"rrf": {}}));
    params.insert("size".into(), json!(req.n_results));

    let mut source = vec!["_id", "document", "metadata"];
    if req.include.embeddings() {
        source.push("embedding");
    }
    params.insert("_source".into(), json!(source));

    Value::Object(params)
}

fn has_column(row: &MySqlRow, name: &str) -> bool {
    row.columns().iter().any(|c| c.name() == name)
}

fn row_to_record(row: &MySqlRow) -> Result<(Record, Option<f64>)> {
    let id = match row.try_get::<String, _>("_id") {
        Ok(id) => id,
        Err(_) => {
            let raw: Vec<u8> = row.try_get("_id").context("Missing _id column")?;
            String::from_utf8(raw).context("Record id is not valid UTF-8")?
        }
    };

    let document: Option<String> = if has_column(row, "document") {
        row.try_get("document")?
    } else {
        None
    };

    let metadata: Metadata = if has_column(row, "metadata") {
        let value = match row.try_get::<Option<Value>, _>("metadata") {
            Ok(v) => v,
            Err(_) => row
                .try_get::<Option<String>, _>("metadata")?
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .with_context(|| format!("Corrupt metadata for record {}", id))?,
        };
        match value {
            Some(Value::Object(map)) => map,
            _ => Metadata::new(),
        }
    } else {
        Metadata::new()
    };

    let embedding = if has_column(row, "embedding") {
        match row.try_get::<Option<String>, _>("embedding")? {
            Some(text) => parse_vector_literal(&text)?,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    let distance = if has_column(row, "_distance") {
        row.try_get::<Option<f64>, _>("_distance")?
    } else {
        None
    };

    Ok((
        Record {
            id,
            document,
            metadata,
            embedding,
        },
        distance,
    ))
}

/// seekdb server implementation of the [`CollectionStore`] trait.
pub struct ServerStore {
    pool: MySqlPool,
}

impl ServerStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn require(&self, name: &str) -> Result<CollectionInfo> {
        self.get_collection(name)
            .await?
            .ok_or_else(|| missing_collection(name))
    }

    async fn fetch_records(&self, fragment: &SqlFragment) -> Result<Vec<(Record, Option<f64>)>> {
        tracing::debug!(sql = %fragment.sql, params = fragment.params.len(), "seekdb query");
        let rows = fragment.bind().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl CollectionStore for ServerStore {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            "SELECT TABLE_NAME, TABLE_COMMENT FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut collections = Vec::new();
        for row in rows {
            let table: String = row.try_get(0)?;
            if !table.starts_with(TABLE_PREFIX) {
                continue;
            }
            let comment: String = row.try_get(1)?;
            match parse_table_comment(&table, &comment) {
                Some(info) => collections.push(info),
                None => tracing::warn!(table = %table, "Skipping table with unreadable collection settings"),
            }
        }
        Ok(collections)
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query(
            "SELECT TABLE_NAME, TABLE_COMMENT FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
        )
        .bind(table_name(name))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let table: String = row.try_get(0)?;
                let comment: String = row.try_get(1)?;
                parse_table_comment(&table, &comment)
                    .map(Some)
                    .with_context(|| format!("Table {} has unreadable collection settings", table))
            }
            None => Ok(None),
        }
    }

    async fn create_collection(&self, info: &CollectionInfo) -> Result<()> {
        if self.get_collection(&info.name).await?.is_some() {
            bail!("Collection '{}' already exists", info.name);
        }
        let sql = create_table_sql(info)?;
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create collection '{}'", info.name))?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.require(name).await?;
        sqlx::query(&format!("DROP TABLE {}", quoted_table(name)))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add(&self, collection: &str, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let info = self.require(collection).await?;

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let existing = self
            .fetch_records(&get_sql(
                collection,
                &GetRequest {
                    ids: Some(ids),
                    include: Include::new(Vec::new()),
                    ..Default::default()
                },
            ))
            .await?;
        validate_batch(&info, records, existing.iter().map(|(r, _)| r.id.as_str()))?;

        let mut sql = format!(
            "INSERT INTO {} (_id, document, embedding, metadata) VALUES ",
            quoted_table(collection)
        );
        sql.push_str(&vec!["(?, ?, ?, ?)"; records.len()].join(", "));

        let mut query = sqlx::query(&sql);
        for record in records {
            query = query
                .bind(record.id.clone())
                .bind(record.document.clone())
                .bind(vector_literal(&record.embedding))
                .bind(serde_json::to_string(&record.metadata)?);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.require(collection).await?;
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}",
            quoted_table(collection)
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn get(&self, collection: &str, req: &GetRequest) -> Result<GetResult> {
        self.require(collection).await?;
        let rows = self.fetch_records(&get_sql(collection, req)).await?;
        Ok(GetResult::from_records(rows.iter().map(|(r, _)| r), &req.include))
    }

    async fn query(&self, collection: &str, req: &QueryRequest) -> Result<QueryResult> {
        let info = self.require(collection).await?;
        let mut result = QueryResult::empty(&req.include, true);
        for embedding in &req.query_embeddings {
            let fragment = knn_sql(
                collection,
                info.distance,
                embedding,
                req.n_results,
                req.filter.as_ref(),
                req.document_filter.as_ref(),
                &req.include,
            );
            let rows = self.fetch_records(&fragment).await?;
            result.push_query(rows.iter().map(|(r, d)| (r, *d)));
        }
        Ok(result)
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        req: &HybridSearchRequest,
    ) -> Result<QueryResult> {
        self.require(collection).await?;
        let params = hybrid_search_params(req);
        let generated: String = sqlx::query_scalar("SELECT DBMS_HYBRID_SEARCH.GET_SQL(?, ?)")
            .bind(table_name(collection))
            .bind(params.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Hybrid search is not available on this seekdb server")?;

        let rows = self
            .fetch_records(&SqlFragment::new(generated, Vec::new()))
            .await?;
        let mut result = QueryResult::empty(&req.include, false);
        result.push_query(rows.iter().map(|(r, _)| (r, None)));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seekdb_core::models::{FullTextClause, KnnClause, Rank};

    fn info() -> CollectionInfo {
        CollectionInfo {
            name: "mobiles".to_string(),
            dimension: 384,
            distance: DistanceMetric::Cosine,
            embedding_model: Some("all-minilm-l6-v2".to_string()),
        }
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql(&info()).unwrap();
        assert!(sql.starts_with("CREATE TABLE `c$v1$mobiles`"));
        assert!(sql.contains("embedding VECTOR(384)"));
        assert!(sql.contains("distance=cosine, type=hnsw"));
        assert!(sql.contains("FULLTEXT INDEX idx_fts (document)"));
        assert!(sql.contains(r#"COMMENT = '{"dimension":384,"distance":"cosine","embedding_model":"all-minilm-l6-v2"}'"#));
    }

    #[test]
    fn test_comment_roundtrip_and_prefix() {
        let comment = r#"{"dimension":8,"distance":"l2","embedding_model":null}"#;
        let parsed = parse_table_comment("c$v1$docs", comment).unwrap();
        assert_eq!(parsed.name, "docs");
        assert_eq!(parsed.dimension, 8);
        assert_eq!(parsed.distance, DistanceMetric::L2);
        assert!(!parsed.has_embedding_function());
        assert!(parse_table_comment("other_table", comment).is_none());
        assert!(parse_table_comment("c$v1$docs", "not json").is_none());
    }

    #[test]
    fn test_escape_in_comment() {
        let mut i = info();
        i.embedding_model = Some("it's".to_string());
        assert!(create_table_sql(&i).unwrap().contains("it''s"));
    }

    #[test]
    fn test_json_path_quotes_keys() {
        assert_eq!(json_path("Brand"), "$.\"Brand\"");
        assert_eq!(json_path("Screen \"Size\""), "$.\"Screen \\\"Size\\\"\"");
    }

    #[test]
    fn test_filter_sql_binds_values() {
        let f = Filter::parse(&json!({"Brand": "SAMSUNG", "Price": {"$gte": 1000}})).unwrap();
        let frag = filter_sql(&f);
        assert_eq!(
            frag.sql,
            "(JSON_UNQUOTE(JSON_EXTRACT(metadata, ?)) = ?) AND (JSON_EXTRACT(metadata, ?) >= ?)"
        );
        assert_eq!(
            frag.params,
            vec![
                SqlParam::Str("$.\"Brand\"".into()),
                SqlParam::Str("SAMSUNG".into()),
                SqlParam::Str("$.\"Price\"".into()),
                SqlParam::Int(1000),
            ]
        );
    }

    #[test]
    fn test_negations_accept_missing_keys() {
        let f = Filter::parse(&json!({"year": {"$nin": [2020, 2021.5]}})).unwrap();
        let frag = filter_sql(&f);
        assert!(frag.sql.starts_with("JSON_EXTRACT(metadata, ?) IS NULL OR NOT ("));
        assert_eq!(frag.params.len(), 5);
        assert_eq!(frag.params[4], SqlParam::Float(2021.5));
    }

    #[test]
    fn test_empty_in_never_matches() {
        let f = Filter::parse(&json!({"k": {"$in": []}})).unwrap();
        assert_eq!(filter_sql(&f).sql, "1 = 0");
    }

    #[test]
    fn test_get_sql_with_ids_and_pagination() {
        let req = GetRequest {
            ids: Some(vec!["a".into(), "b".into()]),
            limit: Some(10),
            offset: 5,
            ..Default::default()
        };
        let frag = get_sql("mobiles", &req);
        assert_eq!(
            frag.sql,
            "SELECT _id, document, metadata FROM `c$v1$mobiles` WHERE (_id IN (?, ?)) LIMIT ? OFFSET ?"
        );
        assert_eq!(frag.params[2], SqlParam::Int(10));
        assert_eq!(frag.params[3], SqlParam::Int(5));
    }

    #[test]
    fn test_get_sql_plain() {
        let frag = get_sql("mobiles", &GetRequest::default());
        assert_eq!(frag.sql, "SELECT _id, document, metadata FROM `c$v1$mobiles`");
        assert!(frag.params.is_empty());
    }

    #[test]
    fn test_knn_sql() {
        let frag = knn_sql(
            "mobiles",
            DistanceMetric::L2,
            &[0.5, 1.0],
            3,
            None,
            Some(&DocumentFilter::contains("battery")),
            &Include::parse("documents,embeddings").unwrap(),
        );
        assert_eq!(
            frag.sql,
            "SELECT _id, document, metadata, embedding, l2_distance(embedding, ?) AS _distance \
             FROM `c$v1$mobiles` WHERE (MATCH(document) AGAINST (? IN NATURAL LANGUAGE MODE)) \
             ORDER BY l2_distance(embedding, ?) APPROXIMATE LIMIT ?"
        );
        assert_eq!(frag.params[0], SqlParam::Str("[0.5,1]".into()));
        assert_eq!(frag.params[3], SqlParam::Int(3));
    }

    #[test]
    fn test_hybrid_params_delegate_rrf() {
        let brand = Filter::parse(&json!({"Brand": "SAMSUNG"})).unwrap();
        let req = HybridSearchRequest {
            query: FullTextClause {
                document_filter: Some(DocumentFilter::contains("battery")),
                filter: Some(brand.clone()),
                n_results: 10,
            },
            knn: KnnClause {
                query_text: "battery".into(),
                query_embedding: vec![0.25, 0.5],
                filter: Some(brand),
                n_results: 10,
            },
            rank: Rank::Rrf,
            n_results: 5,
            include: Include::default(),
        };
        let params = hybrid_search_params(&req);
        assert_eq!(params["rank"], json!({"rrf": {}}));
        assert_eq!(params["size"], json!(5));
        assert_eq!(params["knn"]["k"], json!(10));
        assert_eq!(params["knn"]["query_vector"], json!([0.25, 0.5]));
        assert_eq!(
            params["query"]["bool"]["must"][0]["query_string"]["query"],
            json!("battery")
        );
        assert_eq!(
            params["query"]["bool"]["filter"][0],
            json!({"term": {"metadata.Brand": "SAMSUNG"}})
        );
        assert_eq!(params["_source"], json!(["_id", "document", "metadata"]));
    }

    #[test]
    fn test_range_dsl() {
        let f = Filter::parse(&json!({"Price": {"$lt": 2000}})).unwrap();
        assert_eq!(filter_dsl(&f), json!({"range": {"metadata.Price": {"lt": 2000}}}));
    }
}
