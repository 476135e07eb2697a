//! Tabular import (`seekdb import`).
//!
//! Reads a CSV or Excel file, turns each row into a record, and adds the
//! records to a collection in batches. With `--vectorize-column` that
//! column becomes the document text (embedded by the configured provider)
//! and every other column becomes metadata. Without it all columns are
//! metadata and each record gets a random placeholder vector so the
//! collection still supports scalar filtering.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use rand::Rng;
use uuid::Uuid;

use seekdb_core::models::Metadata;

use crate::client::{Client, Collection};
use crate::config::Config;
use crate::tabular::{self, cell_text, Table};

/// Options for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub file: PathBuf,
    pub vectorize_column: Option<String>,
    pub collection: Option<String>,
    pub batch_size: usize,
}

/// Rows converted into record fields.
#[derive(Debug, Clone)]
pub struct ImportData {
    pub ids: Vec<String>,
    /// Present only when a column is vectorized.
    pub documents: Option<Vec<String>>,
    pub metadatas: Vec<Metadata>,
}

/// Collection name derived from the file stem: spaces and dashes become
/// underscores.
pub fn default_collection_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace([' ', '-'], "_"))
        .unwrap_or_default()
}

/// Split a cleaned table into ids, documents, and metadata.
pub fn prepare_import(table: &Table, vectorize_column: Option<&str>) -> Result<ImportData> {
    let doc_index = match vectorize_column {
        Some(col) => match table.columns.iter().position(|c| c == col) {
            Some(i) => Some(i),
            None => bail!(
                "Column '{}' not found. Available columns: {:?}",
                col,
                table.columns
            ),
        },
        None => None,
    };

    let ids = (0..table.len()).map(|_| Uuid::new_v4().to_string()).collect();

    let documents = doc_index.map(|i| table.rows.iter().map(|row| cell_text(&row[i])).collect());

    let metadatas = table
        .rows
        .iter()
        .map(|row| {
            table
                .columns
                .iter()
                .zip(row)
                .enumerate()
                .filter(|(i, _)| Some(*i) != doc_index)
                .map(|(_, (col, value))| (col.clone(), value.clone()))
                .collect()
        })
        .collect();

    Ok(ImportData {
        ids,
        documents,
        metadatas,
    })
}

/// Random vector used for records imported without an embedding function.
pub fn placeholder_embedding(dimension: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dimension).map(|_| rng.gen::<f32>()).collect()
}

/// Run `seekdb import`: returns the collection name and its final count.
pub async fn run_import(config: &Config, opts: &ImportOptions) -> Result<(String, usize)> {
    if opts.batch_size == 0 {
        bail!("--batch-size must be greater than 0");
    }

    println!("Reading file: {}", opts.file.display());
    let table = tabular::clean(tabular::read_file(&opts.file)?);
    println!(
        "Loaded {} records with columns: {:?}",
        table.len(),
        table.columns
    );
    if let Some(col) = &opts.vectorize_column {
        if !table.columns.contains(col) {
            bail!(
                "Column '{}' not found. Available columns: {:?}",
                col,
                table.columns
            );
        }
    }

    println!("Connecting to seekdb...");
    let client = Client::connect(config).await?;
    import_table(&client, &table, opts).await
}

/// Import an already loaded table through `client`.
pub async fn import_table(
    client: &Client,
    table: &Table,
    opts: &ImportOptions,
) -> Result<(String, usize)> {
    let name = opts
        .collection
        .clone()
        .unwrap_or_else(|| default_collection_name(&opts.file));
    println!("Collection name: {}", name);

    let collection = match &opts.vectorize_column {
        Some(col) => {
            println!("Creating collection with vectorization on column: {}", col);
            let collection = client.get_or_create_collection(&name, true).await?;
            if let Some(model) = &collection.info().embedding_model {
                println!(
                    "Using embedding function: {} ({} dimensions)",
                    model,
                    collection.info().dimension
                );
            }
            collection
        }
        None => {
            println!("Creating collection without vectorization");
            client.get_or_create_collection(&name, false).await?
        }
    };

    let data = prepare_import(table, opts.vectorize_column.as_deref())?;
    let total = data.ids.len();
    println!(
        "Importing {} records in batches of {}...",
        total, opts.batch_size
    );

    let mut imported = 0;
    for start in (0..total).step_by(opts.batch_size.max(1)) {
        let end = (start + opts.batch_size).min(total);
        let ids = data.ids[start..end].to_vec();
        let metadatas = data.metadatas[start..end].to_vec();
        match &data.documents {
            Some(docs) => {
                collection
                    .add(ids, Some(docs[start..end].to_vec()), metadatas, None)
                    .await?;
            }
            None => {
                let dimension = collection.info().dimension;
                let embeddings = (start..end).map(|_| placeholder_embedding(dimension)).collect();
                collection.add(ids, None, metadatas, Some(embeddings)).await?;
            }
        }
        imported = end;
        println!("  Imported {}/{} records", imported, total);
    }
    tracing::debug!(collection = %name, imported, "Import finished");

    let count = collection.count().await?;
    println!("\nImport complete!");
    println!("Total records in collection '{}': {}", name, count);
    print_preview(&collection).await?;

    Ok((name, count))
}

async fn print_preview(collection: &Collection) -> Result<()> {
    let preview = collection.peek(2).await?;
    println!("\nPreview of imported data:");
    for (i, id) in preview.ids.iter().enumerate() {
        println!("  ID: {}...", id.chars().take(8).collect::<String>());
        if let Some(Some(doc)) = preview.documents.as_ref().and_then(|d| d.get(i)) {
            if !doc.is_empty() {
                println!("  Document: {}...", doc.chars().take(80).collect::<String>());
            }
        }
        let keys: Vec<&String> = preview
            .metadatas
            .as_ref()
            .and_then(|m| m.get(i))
            .and_then(|m| m.as_ref())
            .map(|m| m.keys().collect())
            .unwrap_or_default();
        println!("  Metadata keys: {:?}", keys);
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client;
    use seekdb_core::models::GetRequest;
    use serde_json::{json, Value};

    fn phones() -> Table {
        Table {
            columns: vec!["Brand".into(), "Details".into(), "Price".into()],
            rows: vec![
                vec![json!("REDMI"), json!("cheap phone with battery"), json!(899)],
                vec![json!("SAMSUNG"), json!("great camera"), json!(5999)],
                vec![json!("SAMSUNG"), json!(""), json!(4999)],
            ],
        }
    }

    fn opts(vectorize: Option<&str>, batch_size: usize) -> ImportOptions {
        ImportOptions {
            file: PathBuf::from("data/mobile-phones list.csv"),
            vectorize_column: vectorize.map(str::to_string),
            collection: None,
            batch_size,
        }
    }

    #[test]
    fn test_default_collection_name() {
        assert_eq!(
            default_collection_name(Path::new("data/mobile-phones list.xlsx")),
            "mobile_phones_list"
        );
    }

    #[test]
    fn test_prepare_with_vectorized_column() {
        let data = prepare_import(&phones(), Some("Details")).unwrap();
        assert_eq!(data.ids.len(), 3);
        assert_ne!(data.ids[0], data.ids[1]);
        assert!(Uuid::parse_str(&data.ids[0]).is_ok());
        let docs = data.documents.unwrap();
        assert_eq!(docs[1], "great camera");
        assert_eq!(
            data.metadatas[0].keys().collect::<Vec<_>>(),
            vec!["Brand", "Price"]
        );
        assert_eq!(data.metadatas[0]["Price"], json!(899));
    }

    #[test]
    fn test_prepare_without_vectorization_keeps_all_columns() {
        let data = prepare_import(&phones(), None).unwrap();
        assert!(data.documents.is_none());
        assert_eq!(data.metadatas[2].len(), 3);
    }

    #[test]
    fn test_prepare_unknown_column() {
        let err = prepare_import(&phones(), Some("Description")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Column 'Description' not found. Available columns: [\"Brand\", \"Details\", \"Price\"]"
        );
    }

    #[test]
    fn test_placeholder_embedding_dimension() {
        let v = placeholder_embedding(384);
        assert_eq!(v.len(), 384);
        assert!(v.iter().all(|x| (0.0..1.0).contains(x)));
    }

    #[tokio::test]
    async fn test_import_in_batches_with_embeddings() {
        let client = client();
        let (name, count) = import_table(&client, &phones(), &opts(Some("Details"), 2))
            .await
            .unwrap();
        assert_eq!(name, "mobile_phones_list");
        assert_eq!(count, 3);

        let coll = client.get_collection(&name).await.unwrap();
        let all = coll.get(&GetRequest::default()).await.unwrap();
        let docs = all.documents.unwrap();
        assert_eq!(docs[0].as_deref(), Some("cheap phone with battery"));
    }

    #[tokio::test]
    async fn test_import_without_vectorization_uses_placeholder_dimension() {
        let client = client();
        let mut o = opts(None, 100);
        o.collection = Some("plain".to_string());
        let (_, count) = import_table(&client, &phones(), &o).await.unwrap();
        assert_eq!(count, 3);
        let coll = client.get_collection("plain").await.unwrap();
        assert_eq!(coll.info().dimension, 3);
        let peek = coll.peek(1).await.unwrap();
        assert_eq!(peek.embeddings.unwrap()[0].len(), 3);
        assert_eq!(
            peek.metadatas.unwrap()[0].as_ref().unwrap()["Brand"],
            Value::String("REDMI".into())
        );
    }
}
