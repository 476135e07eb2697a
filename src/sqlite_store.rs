//! SQLite-backed [`CollectionStore`] for embedded mode.
//!
//! Collections live in the `collections` table and records in `records`,
//! ordered by an autoincrement `seq` column. Plain paginated `get` calls
//! are answered with `LIMIT`/`OFFSET`; everything involving filters or
//! vectors loads the collection and runs [`seekdb_core::search`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use seekdb_core::embedding::{blob_to_vec, vec_to_blob, DistanceMetric};
use seekdb_core::models::{
    CollectionInfo, GetRequest, GetResult, HybridSearchRequest, Metadata, QueryRequest,
    QueryResult, Record,
};
use seekdb_core::search;
use seekdb_core::store::{missing_collection, validate_batch, CollectionStore};

// Stays under SQLite's bound-parameter limit.
const ID_LOOKUP_CHUNK: usize = 500;

/// SQLite implementation of the [`CollectionStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require(&self, name: &str) -> Result<CollectionInfo> {
        self.get_collection(name)
            .await?
            .ok_or_else(|| missing_collection(name))
    }

    /// Ids from `records` that are already stored in `collection`.
    async fn existing_ids(&self, collection: &str, records: &[Record]) -> Result<Vec<String>> {
        let mut existing = Vec::new();
        for chunk in records.chunks(ID_LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id FROM records WHERE collection = ");
            builder.push_bind(collection);
            builder.push(" AND id IN (");
            let mut ids = builder.separated(", ");
            for record in chunk {
                ids.push_bind(record.id.as_str());
            }
            ids.push_unseparated(")");
            let found: Vec<String> = builder
                .build_query_scalar()
                .fetch_all(&self.pool)
                .await?;
            existing.extend(found);
        }
        Ok(existing)
    }

    async fn load_records(&self, collection: &str) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ? ORDER BY seq",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_info(row: &SqliteRow) -> Result<CollectionInfo> {
    let distance: String = row.get("distance");
    let dimension: i64 = row.get("dimension");
    Ok(CollectionInfo {
        name: row.get("name"),
        dimension: dimension as usize,
        distance: DistanceMetric::parse(&distance)
            .with_context(|| format!("Unknown distance metric in database: {}", distance))?,
        embedding_model: row.get("embedding_model"),
    })
}

fn row_to_record(row: &SqliteRow) -> Result<Record> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("Corrupt metadata for record {}", id))?;
    let blob: Vec<u8> = row.get("embedding");
    Ok(Record {
        id,
        document: row.get("document"),
        metadata,
        embedding: blob_to_vec(&blob),
    })
}

#[async_trait]
impl CollectionStore for SqliteStore {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            "SELECT name, dimension, distance, embedding_model FROM collections ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_info).collect()
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query(
            "SELECT name, dimension, distance, embedding_model FROM collections WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_info).transpose()
    }

    async fn create_collection(&self, info: &CollectionInfo) -> Result<()> {
        if self.get_collection(&info.name).await?.is_some() {
            bail!("Collection '{}' already exists", info.name);
        }
        sqlx::query(
            "INSERT INTO collections (name, dimension, distance, embedding_model, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&info.name)
        .bind(info.dimension as i64)
        .bind(info.distance.as_str())
        .bind(&info.embedding_model)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(missing_collection(name));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add(&self, collection: &str, records: &[Record]) -> Result<()> {
        let info = self.require(collection).await?;

        let existing = self.existing_ids(collection, records).await?;
        validate_batch(&info, records, existing.iter().map(String::as_str))?;

        let mut tx = self.pool.begin().await?;
        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                "INSERT INTO records (collection, id, document, metadata_json, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.document)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.require(collection).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn get(&self, collection: &str, req: &GetRequest) -> Result<GetResult> {
        self.require(collection).await?;

        if req.ids.is_none() && req.filter.is_none() && req.document_filter.is_none() {
            // SQLite treats a negative LIMIT as unbounded
            let limit = req.limit.map(|l| l as i64).unwrap_or(-1);
            let rows = sqlx::query(
                "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ? ORDER BY seq LIMIT ? OFFSET ?",
            )
            .bind(collection)
            .bind(limit)
            .bind(req.offset as i64)
            .fetch_all(&self.pool)
            .await?;
            let records = rows.iter().map(row_to_record).collect::<Result<Vec<_>>>()?;
            return Ok(GetResult::from_records(&records, &req.include));
        }

        let records = self.load_records(collection).await?;
        Ok(search::get(&records, req))
    }

    async fn query(&self, collection: &str, req: &QueryRequest) -> Result<QueryResult> {
        let info = self.require(collection).await?;
        let records = self.load_records(collection).await?;
        Ok(search::query(&records, info.distance, req))
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        req: &HybridSearchRequest,
    ) -> Result<QueryResult> {
        let info = self.require(collection).await?;
        let records = self.load_records(collection).await?;
        Ok(search::hybrid(&records, info.distance, req))
    }
}
