//! Search and export (`seekdb query`).
//!
//! # Modes
//!
//! The first matching rule picks the mode:
//!
//! | Flags | Mode |
//! |-------|------|
//! | `--list-collections` | list collection names |
//! | `--info` | collection info and preview |
//! | `--get-ids` | get by ids |
//! | `--get-all` | paginated get, optionally filtered |
//! | `--query-text` + `--semantic` | nearest-neighbour query |
//! | `--query-text` | hybrid search (full-text + kNN, RRF) |
//! | `--where` / `--contains` | filtered get |
//! | none of the above | collection info |
//!
//! Results are printed as a listing, as JSON (`--json`), or exported to
//! CSV/XLSX (`--output`).

use std::path::PathBuf;

use anyhow::{bail, Result};

use seekdb_core::filter::{DocumentFilter, Filter};
use seekdb_core::models::{FullTextClause, GetRequest, Include, QueryResult};

use crate::client::{Client, KnnQuery};
use crate::config::Config;
use crate::tabular::{self, cell_text, Table};

/// Parsed `seekdb query` arguments.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub collection: Option<String>,
    pub query_text: Option<String>,
    /// Raw `--where` JSON.
    pub where_json: Option<String>,
    pub contains: Option<String>,
    pub semantic: bool,
    pub get_all: bool,
    pub limit: usize,
    pub offset: usize,
    pub get_ids: Option<String>,
    pub info: bool,
    pub list_collections: bool,
    pub n_results: usize,
    pub include: Option<String>,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub sheet_name: String,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            collection: None,
            query_text: None,
            where_json: None,
            contains: None,
            semantic: false,
            get_all: false,
            limit: 10,
            offset: 0,
            get_ids: None,
            info: false,
            list_collections: false,
            n_results: 5,
            include: None,
            json: false,
            output: None,
            sheet_name: tabular::DEFAULT_SHEET_NAME.to_string(),
        }
    }
}

/// What a `seekdb query` invocation does.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMode {
    ListCollections,
    Info,
    GetIds(Vec<String>),
    GetAll,
    Semantic(String),
    Hybrid(String),
    Filter,
}

/// Pick the mode for a set of options.
pub fn resolve_mode(opts: &QueryOptions) -> QueryMode {
    if opts.list_collections {
        return QueryMode::ListCollections;
    }
    if opts.info {
        return QueryMode::Info;
    }
    if let Some(raw) = &opts.get_ids {
        return QueryMode::GetIds(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        );
    }
    if opts.get_all {
        return QueryMode::GetAll;
    }
    if let Some(text) = &opts.query_text {
        return if opts.semantic {
            QueryMode::Semantic(text.clone())
        } else {
            QueryMode::Hybrid(text.clone())
        };
    }
    if opts.where_json.is_some() || opts.contains.is_some() {
        return QueryMode::Filter;
    }
    QueryMode::Info
}

/// Run `seekdb query`.
pub async fn run_query(config: &Config, opts: &QueryOptions) -> Result<()> {
    let mode = resolve_mode(opts);
    if mode != QueryMode::ListCollections && opts.collection.is_none() {
        bail!("collection name is required (except for --list-collections)");
    }
    // reject bad filters before connecting
    let filter = parse_where(opts)?;
    let include = parse_include(opts)?;
    if opts.n_results == 0 {
        bail!("--n-results must be greater than 0");
    }

    let client = Client::connect(config).await?;
    match execute(&client, opts, &mode, filter, include).await? {
        Some(results) => output_results(&results, opts),
        None => Ok(()),
    }
}

fn parse_where(opts: &QueryOptions) -> Result<Option<Filter>> {
    opts.where_json
        .as_deref()
        .map(Filter::from_json_str)
        .transpose()
}

fn parse_include(opts: &QueryOptions) -> Result<Include> {
    match &opts.include {
        Some(list) => Include::parse(list),
        None => Ok(Include::default()),
    }
}

/// Run the selected mode. Listing and info print directly and return
/// `None`; every other mode returns results in the nested query shape.
pub async fn execute(
    client: &Client,
    opts: &QueryOptions,
    mode: &QueryMode,
    filter: Option<Filter>,
    include: Include,
) -> Result<Option<QueryResult>> {
    let name = opts.collection.as_deref().unwrap_or_default();
    let document_filter = opts.contains.clone().map(DocumentFilter::Contains);

    let results = match mode {
        QueryMode::ListCollections => {
            list_collections(client).await?;
            return Ok(None);
        }
        QueryMode::Info => {
            collection_info(client, name).await?;
            return Ok(None);
        }
        QueryMode::GetIds(ids) => {
            let collection = client.get_collection(name).await?;
            let req = GetRequest {
                ids: Some(ids.clone()),
                include,
                ..Default::default()
            };
            collection.get(&req).await?.into_query_result()
        }
        QueryMode::GetAll => {
            let collection = client.get_collection(name).await?;
            let req = GetRequest {
                filter,
                document_filter,
                limit: Some(opts.limit),
                offset: opts.offset,
                include,
                ..Default::default()
            };
            collection.get(&req).await?.into_query_result()
        }
        QueryMode::Filter => {
            let collection = client.get_collection(name).await?;
            let req = GetRequest {
                filter,
                document_filter,
                include,
                ..Default::default()
            };
            collection.get(&req).await?.into_query_result()
        }
        QueryMode::Semantic(text) => {
            let collection = client.get_collection(name).await?;
            collection
                .query(
                    &[text.clone()],
                    opts.n_results,
                    filter,
                    document_filter,
                    include,
                )
                .await?
        }
        QueryMode::Hybrid(text) => {
            let collection = client.get_collection(name).await?;
            let needle = opts.contains.clone().unwrap_or_else(|| text.clone());
            let candidates = opts.n_results * 2;
            collection
                .hybrid_search(
                    FullTextClause {
                        document_filter: Some(DocumentFilter::Contains(needle)),
                        filter: filter.clone(),
                        n_results: candidates,
                    },
                    KnnQuery {
                        query_text: text.clone(),
                        filter,
                        n_results: candidates,
                    },
                    opts.n_results,
                    include,
                )
                .await?
        }
    };
    Ok(Some(results))
}

async fn list_collections(client: &Client) -> Result<()> {
    let collections = client.list_collections().await?;
    if collections.is_empty() {
        println!("No collections found.");
        return Ok(());
    }
    println!("\nAvailable collections:");
    for c in collections {
        println!("  - {}", c.name);
    }
    Ok(())
}

async fn collection_info(client: &Client, name: &str) -> Result<()> {
    let collection = client.get_collection(name).await?;
    let count = collection.count().await?;
    println!("\nCollection: {}", name);
    println!("  Total records: {}", count);
    if count == 0 {
        return Ok(());
    }

    let preview = collection.peek(3).await?;
    println!("\nPreview (first 3 records):");
    for (i, id) in preview.ids.iter().enumerate() {
        println!("  ID: {}...", truncate_chars(id, 20));
        if let Some(Some(doc)) = preview.documents.as_ref().and_then(|d| d.get(i)) {
            if !doc.is_empty() {
                println!("    Document: {}", ellipsize(doc, 50));
            }
        }
        if let Some(Some(meta)) = preview.metadatas.as_ref().and_then(|m| m.get(i)) {
            println!("    Metadata keys: {:?}", meta.keys().collect::<Vec<_>>());
        }
    }
    Ok(())
}

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// First `n` characters plus `...` when `s` is longer.
pub fn ellipsize(s: &str, n: usize) -> String {
    if s.chars().count() > n {
        format!("{}...", truncate_chars(s, n))
    } else {
        s.to_string()
    }
}

fn output_results(results: &QueryResult, opts: &QueryOptions) -> Result<()> {
    if let Some(path) = &opts.output {
        let table = Table::from_query_result(results);
        if table.is_empty() {
            println!("No results found to export.");
            return Ok(());
        }
        let abs = tabular::export(&table, path, &opts.sheet_name)?;
        println!("Exported {} records to: {}", table.len(), abs.display());
    } else if opts.json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else {
        print!("{}", format_results(results));
    }
    Ok(())
}

/// Human-readable listing of the first query's hits.
pub fn format_results(results: &QueryResult) -> String {
    if results.is_empty() {
        return "No results found.\n".to_string();
    }
    let ids = &results.ids[0];
    let distances = results.distances.as_ref().and_then(|d| d.first());
    let documents = results.documents.as_ref().and_then(|d| d.first());
    let metadatas = results.metadatas.as_ref().and_then(|m| m.first());

    let mut out = format!("\nFound {} results:\n\n{}\n", ids.len(), "=".repeat(80));
    for (i, id) in ids.iter().enumerate() {
        out.push_str(&format!("\n[Result {}]\n", i + 1));
        out.push_str(&format!("  ID: {}\n", id));
        if let Some(d) = distances.and_then(|d| d.get(i)) {
            out.push_str(&format!("  Distance: {:.4}\n", d));
        }
        if let Some(Some(doc)) = documents.and_then(|d| d.get(i)) {
            if !doc.is_empty() {
                out.push_str(&format!("  Document: {}\n", ellipsize(doc, 200)));
            }
        }
        if let Some(Some(meta)) = metadatas.and_then(|m| m.get(i)) {
            out.push_str("  Metadata:\n");
            for (key, value) in meta {
                out.push_str(&format!("    - {}: {}\n", key, ellipsize(&cell_text(value), 100)));
            }
        }
    }
    out
}
