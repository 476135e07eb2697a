//! Documentation catalog generation (`seekdb catalog`).
//!
//! Walks a directory of markdown pages, asks an OpenAI-compatible chat model
//! for a one-sentence search-oriented description of each page, and writes
//! a JSONL catalog with one `{path, description, branch?}` object per line.
//!
//! Incremental runs keep a `path -> md5` cache next to the catalog; pages
//! whose content hash has not changed and which already have an entry are
//! carried over without another model call.

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use walkdir::WalkDir;

use crate::config::Config;
use crate::llm::{ChatClient, ChatRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TRUNCATION_MARKER: &str = "\n\n[... content truncated ...]";
const DRY_RUN_DESCRIPTION: &str = "(dry run - not generated)";

const SYSTEM_PROMPT: &str = "You are a technical documentation indexer. \
Given a documentation page, write a search-oriented description of it.\n\n\
Rules:\n\
- Write ONE sentence, two at most.\n\
- Start with \"This document...\" or with a noun phrase naming the topic.\n\
- Include the key terms, features, SQL statements and API names a user would search for.\n\
- Do not repeat the file path or the page title verbatim.\n\
- No marketing language.\n\
- Keep it under 300 characters.";

/// One catalog line. Unknown fields from an existing catalog are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub path: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(path: &str, description: &str, branch: Option<&String>) -> Self {
        Self {
            path: path.to_string(),
            description: description.to_string(),
            branch: branch.cloned(),
            extra: Map::new(),
        }
    }
}

/// Produces a description for one page.
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, path: &str, content: &str) -> Result<String>;
}

/// Describer backed by a chat-completions endpoint.
pub struct LlmDescriber {
    client: ChatClient,
}

impl LlmDescriber {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Describer for LlmDescriber {
    async fn describe(&self, path: &str, content: &str) -> Result<String> {
        let req = ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: user_prompt(path, content),
        };
        self.client.complete(&req).await
    }
}

fn user_prompt(path: &str, content: &str) -> String {
    format!(
        "Write a search-oriented description for the following seekdb documentation page.\n\n\
         File path: {}\n\n\
         Content (may be truncated):\n---\n{}\n---\n\n\
         Description:",
        path, content
    )
}

/// All `*.md` files under `docs_dir`, as sorted forward-slash relative paths.
pub fn collect_markdown_files(docs_dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(docs_dir).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to walk {}", docs_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let rel = entry.path().strip_prefix(docs_dir).unwrap_or(entry.path());
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}

/// Hex MD5 of a file, read in chunks.
pub fn file_md5(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `path<TAB>branch` lines. A missing file yields an empty map.
pub fn load_branch_map(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        tracing::warn!("Branch map not found: {}", path.display());
        return Ok(HashMap::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let map: HashMap<String, String> = text
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.trim().split('\t').collect();
            match parts.as_slice() {
                [p, b] => Some((p.to_string(), b.to_string())),
                _ => None,
            }
        })
        .collect();
    tracing::info!("Loaded branch map: {} entries", map.len());
    Ok(map)
}

/// Cached `path -> md5`. Missing or unreadable caches are empty.
pub fn load_hash_cache(path: &Path) -> HashMap<String, String> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

pub fn save_hash_cache(path: &Path, cache: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let sorted: BTreeMap<&String, &String> = cache.iter().collect();
    let text = serde_json::to_string_pretty(&sorted)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Entries of an existing catalog keyed by path. Malformed lines are skipped.
pub fn load_existing_catalog(path: &Path) -> HashMap<String, CatalogEntry> {
    let Ok(file) = std::fs::File::open(path) else {
        return HashMap::new();
    };
    let entries: HashMap<String, CatalogEntry> = BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<CatalogEntry>(&line).ok())
        .map(|entry| (entry.path.clone(), entry))
        .collect();
    tracing::info!("Loaded existing catalog: {} entries", entries.len());
    entries
}

/// First `max_chars` characters, with a marker when anything was cut.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &content[..idx], TRUNCATION_MARKER),
        None => content.to_string(),
    }
}

/// Inputs for [`process_files`].
pub struct ProcessContext<'a> {
    pub docs_dir: &'a Path,
    pub branch_map: &'a HashMap<String, String>,
    pub existing: &'a HashMap<String, CatalogEntry>,
    pub hash_cache: &'a mut HashMap<String, String>,
    pub describer: Option<Arc<dyn Describer>>,
    pub concurrency: usize,
    pub max_chars: usize,
    pub incremental: bool,
    pub dry_run: bool,
}

/// Build catalog entries for `files`. Updates `hash_cache` for every page
/// that received a non-empty description.
pub async fn process_files(files: &[String], ctx: ProcessContext<'_>) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();
    let mut pending = Vec::new();
    let mut skipped = 0usize;

    for rel in files {
        let full = ctx.docs_dir.join(rel);
        let hash = file_md5(&full)?;
        if ctx.incremental && ctx.hash_cache.get(rel) == Some(&hash) {
            if let Some(existing) = ctx.existing.get(rel) {
                let mut entry = existing.clone();
                if let Some(branch) = ctx.branch_map.get(rel) {
                    entry.branch = Some(branch.clone());
                }
                entries.push(entry);
                skipped += 1;
                continue;
            }
        }
        pending.push((rel.clone(), full, hash));
    }
    if ctx.incremental {
        tracing::info!("Incremental mode: skipped {} unchanged files", skipped);
    }

    if ctx.dry_run {
        for (rel, _, _) in &pending {
            tracing::info!("[DRY RUN] Would process: {}", rel);
            entries.push(CatalogEntry::new(rel, DRY_RUN_DESCRIPTION, ctx.branch_map.get(rel)));
        }
        tracing::info!("[DRY RUN] Would process {} files total", pending.len());
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        return Ok(entries);
    }

    let Some(describer) = ctx.describer else {
        bail!("no describer configured for catalog generation");
    };

    tracing::info!("Generating descriptions for {} files...", pending.len());
    let semaphore = Arc::new(Semaphore::new(ctx.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (rel, full, hash) in pending {
        let content = match std::fs::read(&full) {
            Ok(bytes) => truncate_content(&String::from_utf8_lossy(&bytes), ctx.max_chars),
            Err(err) => {
                tracing::error!("Failed to read {}: {}", full.display(), err);
                entries.push(CatalogEntry::new(&rel, "", ctx.branch_map.get(&rel)));
                continue;
            }
        };
        let semaphore = semaphore.clone();
        let describer = describer.clone();
        tasks.spawn(async move {
            let description = match semaphore.acquire_owned().await {
                Ok(_permit) => match describer.describe(&rel, &content).await {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!("Failed to generate description for {}: {:#}", rel, err);
                        String::new()
                    }
                },
                Err(_) => String::new(),
            };
            (rel, hash, description)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (rel, hash, description) = joined.context("description task panicked")?;
        if !description.is_empty() {
            ctx.hash_cache.insert(rel.clone(), hash);
        }
        entries.push(CatalogEntry::new(&rel, &description, ctx.branch_map.get(&rel)));
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Write entries as JSONL, creating parent directories.
pub fn write_catalog(entries: &[CatalogEntry], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = std::io::BufWriter::new(
        std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
    );
    for entry in entries {
        serde_json::to_writer(&mut file, entry)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    tracing::info!("Wrote {} entries to {}", entries.len(), path.display());
    Ok(())
}

/// Entry counts per branch, `unknown` for entries without one.
pub fn branch_counts(entries: &[CatalogEntry]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        let branch = entry.branch.clone().unwrap_or_else(|| "unknown".to_string());
        *counts.entry(branch).or_insert(0) += 1;
    }
    counts
}

pub fn format_summary(entries: &[CatalogEntry], output: &Path, elapsed_secs: f64, model: &str) -> String {
    let rule = "=".repeat(50);
    let mut out = format!("\n{}\nCatalog generation complete!\n", rule);
    out.push_str(&format!("  Entries:    {}\n", entries.len()));
    out.push_str(&format!("  Output:     {}\n", output.display()));
    out.push_str(&format!("  Time:       {:.1}s\n", elapsed_secs));
    out.push_str(&format!("  Model:      {}\n", model));
    for (branch, count) in branch_counts(entries) {
        out.push_str(&format!("  [{}]: {} files\n", branch, count));
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

/// Parsed `seekdb catalog` arguments, before defaults are applied.
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub skill_dir: PathBuf,
    pub docs_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub branch_map: Option<PathBuf>,
    pub hash_cache: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub max_chars: Option<usize>,
    pub incremental: bool,
    pub dry_run: bool,
}

impl CatalogOptions {
    fn docs_dir(&self) -> PathBuf {
        self.docs_dir
            .clone()
            .unwrap_or_else(|| self.skill_dir.join("seekdb-docs"))
    }

    fn output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.skill_dir.join("references").join("seekdb-docs-catalog.jsonl"))
    }

    fn branch_map(&self) -> PathBuf {
        self.branch_map
            .clone()
            .unwrap_or_else(|| self.skill_dir.join("references").join("_branch_map.tsv"))
    }

    fn hash_cache(&self) -> PathBuf {
        self.hash_cache
            .clone()
            .unwrap_or_else(|| self.skill_dir.join("references").join("_catalog_hash_cache.json"))
    }
}

/// Run `seekdb catalog`.
pub async fn run_catalog(config: &Config, opts: &CatalogOptions) -> Result<()> {
    let start = Instant::now();
    let docs_dir = opts.docs_dir();
    let output = opts.output();
    let hash_cache_path = opts.hash_cache();

    if !docs_dir.is_dir() {
        bail!(
            "Docs directory not found: {}. Run scripts/update_docs.sh first",
            docs_dir.display()
        );
    }

    let base_url = opts
        .base_url
        .clone()
        .or_else(|| config.catalog.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let model = opts
        .model
        .clone()
        .or_else(|| config.catalog.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let api_key = opts.api_key.clone().filter(|k| !k.is_empty());
    if api_key.is_none() && !opts.dry_run {
        bail!("API key required. Set OPENAI_API_KEY or use --api-key.");
    }

    let files = collect_markdown_files(&docs_dir)?;
    if files.is_empty() {
        bail!("No .md files found in {}", docs_dir.display());
    }
    tracing::info!("Found {} markdown files in {}", files.len(), docs_dir.display());

    let branch_map = load_branch_map(&opts.branch_map())?;
    let (existing, mut hash_cache) = if opts.incremental {
        (load_existing_catalog(&output), load_hash_cache(&hash_cache_path))
    } else {
        (HashMap::new(), HashMap::new())
    };

    let describer: Option<Arc<dyn Describer>> = match &api_key {
        Some(key) if !opts.dry_run => Some(Arc::new(LlmDescriber::new(
            ChatClient::new(&base_url, key, &model)?.with_max_retries(config.catalog.max_retries),
        ))),
        _ => None,
    };

    let entries = process_files(
        &files,
        ProcessContext {
            docs_dir: &docs_dir,
            branch_map: &branch_map,
            existing: &existing,
            hash_cache: &mut hash_cache,
            describer,
            concurrency: opts.concurrency.unwrap_or(config.catalog.concurrency),
            max_chars: opts.max_chars.unwrap_or(config.catalog.max_chars),
            incremental: opts.incremental,
            dry_run: opts.dry_run,
        },
    )
    .await?;

    if opts.dry_run {
        println!(
            "\n[DRY RUN] Would generate {} entries in {}",
            entries.len(),
            output.display()
        );
        return Ok(());
    }

    write_catalog(&entries, &output)?;
    save_hash_cache(&hash_cache_path, &hash_cache)?;
    print!(
        "{}",
        format_summary(&entries, &output, start.elapsed().as_secs_f64(), &model)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Describer for Echo {
        async fn describe(&self, path: &str, content: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.contains("broken") {
                bail!("model unavailable");
            }
            Ok(format!("This document covers {} ({} chars).", path, content.len()))
        }
    }

    fn docs() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("guide/vector")).unwrap();
        std::fs::write(root.join("guide/vector/hnsw.md"), "# HNSW\nindex params").unwrap();
        std::fs::write(root.join("intro.md"), "# Intro").unwrap();
        std::fs::write(root.join("notes.txt"), "ignored").unwrap();
        tmp
    }

    fn echo() -> Arc<Echo> {
        Arc::new(Echo {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_collect_markdown_files_sorted_relative() {
        let tmp = docs();
        let files = collect_markdown_files(tmp.path()).unwrap();
        assert_eq!(files, vec!["guide/vector/hnsw.md", "intro.md"]);
    }

    #[test]
    fn test_file_md5() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(file_md5(&path).unwrap(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(
            truncate_content("héllo world", 5),
            "héllo\n\n[... content truncated ...]"
        );
    }

    #[test]
    fn test_branch_map_skips_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("_branch_map.tsv");
        std::fs::write(&path, "intro.md\tV1.0.0\nbad line\na\tb\tc\n").unwrap();
        let map = load_branch_map(&path).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["intro.md"], "V1.0.0");
        assert!(load_branch_map(&tmp.path().join("missing.tsv")).unwrap().is_empty());
    }

    #[test]
    fn test_existing_catalog_keeps_extra_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.jsonl");
        std::fs::write(
            &path,
            "{\"path\":\"a.md\",\"description\":\"A\",\"title\":\"Alpha\"}\nnot json\n",
        )
        .unwrap();
        let existing = load_existing_catalog(&path);
        assert_eq!(existing.len(), 1);
        assert_eq!(existing["a.md"].extra["title"], Value::String("Alpha".into()));
    }

    #[test]
    fn test_hash_cache_round_trip_and_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("refs/cache.json");
        let mut cache = HashMap::new();
        cache.insert("a.md".to_string(), "abc".to_string());
        save_hash_cache(&path, &cache).unwrap();
        assert_eq!(load_hash_cache(&path), cache);
        std::fs::write(&path, "{oops").unwrap();
        assert!(load_hash_cache(&path).is_empty());
    }

    #[tokio::test]
    async fn test_process_files_sorted_with_branches_and_failures() {
        let tmp = docs();
        std::fs::write(tmp.path().join("broken.md"), "x").unwrap();
        let files = collect_markdown_files(tmp.path()).unwrap();
        let mut branches = HashMap::new();
        branches.insert("intro.md".to_string(), "V1.1.0".to_string());
        let mut cache = HashMap::new();
        let describer = echo();

        let entries = process_files(
            &files,
            ProcessContext {
                docs_dir: tmp.path(),
                branch_map: &branches,
                existing: &HashMap::new(),
                hash_cache: &mut cache,
                describer: Some(describer.clone()),
                concurrency: 2,
                max_chars: 8000,
                incremental: false,
                dry_run: false,
            },
        )
        .await
        .unwrap();

        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["broken.md", "guide/vector/hnsw.md", "intro.md"]);
        assert_eq!(entries[0].description, "");
        assert_eq!(entries[2].branch.as_deref(), Some("V1.1.0"));
        assert!(entries[1].branch.is_none());
        assert_eq!(describer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key("broken.md"));
    }

    #[tokio::test]
    async fn test_incremental_reuses_unchanged_entries() {
        let tmp = docs();
        let files = collect_markdown_files(tmp.path()).unwrap();
        let intro_hash = file_md5(&tmp.path().join("intro.md")).unwrap();
        let mut cache = HashMap::new();
        cache.insert("intro.md".to_string(), intro_hash);
        cache.insert("guide/vector/hnsw.md".to_string(), "stale".to_string());
        let mut existing = HashMap::new();
        existing.insert(
            "intro.md".to_string(),
            CatalogEntry::new("intro.md", "Cached description.", None),
        );
        let mut branches = HashMap::new();
        branches.insert("intro.md".to_string(), "V1.2.0".to_string());
        let describer = echo();

        let entries = process_files(
            &files,
            ProcessContext {
                docs_dir: tmp.path(),
                branch_map: &branches,
                existing: &existing,
                hash_cache: &mut cache,
                describer: Some(describer.clone()),
                concurrency: 5,
                max_chars: 8000,
                incremental: true,
                dry_run: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(describer.calls.load(Ordering::SeqCst), 1);
        let intro = entries.iter().find(|e| e.path == "intro.md").unwrap();
        assert_eq!(intro.description, "Cached description.");
        assert_eq!(intro.branch.as_deref(), Some("V1.2.0"));
        assert_ne!(cache["guide/vector/hnsw.md"], "stale");
    }

    #[tokio::test]
    async fn test_dry_run_never_describes() {
        let tmp = docs();
        let files = collect_markdown_files(tmp.path()).unwrap();
        let mut cache = HashMap::new();
        let describer = echo();
        let entries = process_files(
            &files,
            ProcessContext {
                docs_dir: tmp.path(),
                branch_map: &HashMap::new(),
                existing: &HashMap::new(),
                hash_cache: &mut cache,
                describer: Some(describer.clone()),
                concurrency: 5,
                max_chars: 8000,
                incremental: false,
                dry_run: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.description == DRY_RUN_DESCRIPTION));
        assert_eq!(describer.calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_incremental_dry_run_lists_in_path_order() {
        let tmp = docs();
        let files = collect_markdown_files(tmp.path()).unwrap();
        let mut cache = HashMap::new();
        cache.insert(
            "intro.md".to_string(),
            file_md5(&tmp.path().join("intro.md")).unwrap(),
        );
        let mut existing = HashMap::new();
        existing.insert(
            "intro.md".to_string(),
            CatalogEntry::new("intro.md", "Cached description.", None),
        );

        let entries = process_files(
            &files,
            ProcessContext {
                docs_dir: tmp.path(),
                branch_map: &HashMap::new(),
                existing: &existing,
                hash_cache: &mut cache,
                describer: None,
                concurrency: 5,
                max_chars: 8000,
                incremental: true,
                dry_run: true,
            },
        )
        .await
        .unwrap();

        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["guide/vector/hnsw.md", "intro.md"]);
        assert_eq!(entries[0].description, DRY_RUN_DESCRIPTION);
        assert_eq!(entries[1].description, "Cached description.");
    }

    #[test]
    fn test_write_catalog_preserves_non_ascii() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("refs/out.jsonl");
        let entries = vec![
            CatalogEntry::new("a.md", "向量索引", Some(&"V1.0.0".to_string())),
            CatalogEntry::new("b.md", "B", None),
        ];
        write_catalog(&entries, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "{\"path\":\"a.md\",\"description\":\"向量索引\",\"branch\":\"V1.0.0\"}"
        );
        assert_eq!(lines[1], "{\"path\":\"b.md\",\"description\":\"B\"}");
    }

    #[test]
    fn test_summary_counts_unknown_branch() {
        let entries = vec![
            CatalogEntry::new("a.md", "A", Some(&"V1.0.0".to_string())),
            CatalogEntry::new("b.md", "B", None),
        ];
        let text = format_summary(&entries, Path::new("out.jsonl"), 1.26, "gpt-4o-mini");
        assert!(text.contains("  Entries:    2\n"));
        assert!(text.contains("  Time:       1.3s\n"));
        assert!(text.contains("  [V1.0.0]: 1 files\n  [unknown]: 1 files\n"));
    }

    #[tokio::test]
    async fn test_run_catalog_requires_api_key() {
        let tmp = docs();
        let opts = CatalogOptions {
            skill_dir: tmp.path().to_path_buf(),
            docs_dir: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let err = run_catalog(&Config::default(), &opts).await.unwrap_err();
        assert_eq!(err.to_string(), "API key required. Set OPENAI_API_KEY or use --api-key.");
    }

    #[tokio::test]
    async fn test_run_catalog_missing_docs_dir() {
        let tmp = TempDir::new().unwrap();
        let opts = CatalogOptions {
            skill_dir: tmp.path().to_path_buf(),
            dry_run: true,
            ..Default::default()
        };
        let err = run_catalog(&Config::default(), &opts).await.unwrap_err();
        assert!(err.to_string().starts_with("Docs directory not found"));
    }
}
