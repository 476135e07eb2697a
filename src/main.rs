//! # seekdb CLI (`seekdb`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `seekdb import <file>` | Import a CSV/Excel file into a collection |
//! | `seekdb query [collection]` | Search, filter, and export a collection |
//! | `seekdb inspect <file>` | Preview an Excel workbook |
//! | `seekdb catalog` | Generate the documentation catalog |
//! | `seekdb install` | Install skills into an AI tool folder |
//!
//! ## Examples
//!
//! ```bash
//! seekdb import data/phones.xlsx -v Description
//! seekdb query phones -q "long battery life" -w '{"Brand": "SAMSUNG"}'
//! seekdb query phones --get-all --limit 50 -o out/phones.xlsx
//! seekdb catalog --incremental
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use seekdb_skills::catalog::{self, CatalogOptions};
use seekdb_skills::config;
use seekdb_skills::import::{self, ImportOptions};
use seekdb_skills::inspect::{self, InspectOptions};
use seekdb_skills::install::{self, InstallOptions};
use seekdb_skills::query::{self, QueryOptions};

/// Import, query, and export seekdb collections.
#[derive(Parser)]
#[command(name = "seekdb", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/seekdb.toml` when it exists, built-in defaults
    /// otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV or Excel file into a collection.
    Import {
        /// Path to a `.csv`, `.xlsx`, or `.xls` file.
        file: PathBuf,

        /// Column whose text is embedded as the document.
        #[arg(short = 'v', long)]
        vectorize_column: Option<String>,

        /// Collection name (default: file stem).
        #[arg(short = 'c', long)]
        collection: Option<String>,

        /// Records per insert batch (default from config, 100).
        #[arg(short = 'b', long)]
        batch_size: Option<usize>,
    },

    /// Query a collection and print or export the results.
    Query {
        /// Collection name.
        collection: Option<String>,

        /// Search text (hybrid unless `--semantic`).
        #[arg(short = 'q', long)]
        query_text: Option<String>,

        /// Metadata filter as JSON, e.g. `{"price": {"$lt": 1000}}`.
        #[arg(short = 'w', long = "where")]
        where_json: Option<String>,

        /// Document must contain this text.
        #[arg(short = 'c', long)]
        contains: Option<String>,

        /// Pure vector search for `--query-text`.
        #[arg(long)]
        semantic: bool,

        /// Page through all records.
        #[arg(short = 'a', long)]
        get_all: bool,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Comma-separated record ids.
        #[arg(short = 'i', long)]
        get_ids: Option<String>,

        /// Show collection info and a preview.
        #[arg(long)]
        info: bool,

        /// List all collections.
        #[arg(short = 'l', long)]
        list_collections: bool,

        /// Results per query.
        #[arg(short = 'n', long, default_value_t = 5)]
        n_results: usize,

        /// Fields to return: documents,metadatas,embeddings.
        #[arg(long)]
        include: Option<String>,

        /// Print results as JSON.
        #[arg(short = 'j', long)]
        json: bool,

        /// Export results to `.csv` or `.xlsx`.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Sheet name for Excel export.
        #[arg(short = 's', long, default_value = "Data")]
        sheet_name: String,
    },

    /// Preview an Excel workbook.
    Inspect {
        /// Path to a `.xlsx` or `.xls` file.
        file: PathBuf,

        /// Sheet to read (default: first sheet).
        #[arg(short = 's', long)]
        sheet: Option<String>,

        /// Rows to preview.
        #[arg(short = 'r', long, default_value_t = 5)]
        rows: usize,

        /// Only list the sheets.
        #[arg(short = 'l', long)]
        list_sheets: bool,

        /// Show column types and null counts.
        #[arg(short = 'c', long)]
        columns: bool,

        /// Show statistics for numeric columns.
        #[arg(long)]
        stats: bool,

        /// Export the sheet to CSV.
        #[arg(long)]
        to_csv: Option<PathBuf>,

        /// Preview every row.
        #[arg(short = 'a', long)]
        all_rows: bool,
    },

    /// Generate the documentation catalog with an LLM.
    Catalog {
        #[arg(long, env = "OPENAI_BASE_URL")]
        base_url: Option<String>,

        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        #[arg(long, env = "OPENAI_MODEL")]
        model: Option<String>,

        /// Skill directory holding `seekdb-docs/` and `references/`.
        #[arg(long, default_value = ".")]
        skill_dir: PathBuf,

        #[arg(long)]
        docs_dir: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        branch_map: Option<PathBuf>,

        #[arg(long)]
        hash_cache: Option<PathBuf>,

        /// Concurrent LLM requests (default from config, 5).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Characters of each page sent to the model (default from config, 8000).
        #[arg(long)]
        max_chars: Option<usize>,

        /// Reuse entries for pages whose hash is unchanged.
        #[arg(long)]
        incremental: bool,

        /// List what would be processed without calling the API.
        #[arg(long)]
        dry_run: bool,
    },

    /// Install seekdb skills into an AI tool's skills folder.
    Install {
        /// Project root (default: current directory).
        #[arg(long)]
        project_root: Option<PathBuf>,

        /// Directory holding the packaged skills.
        #[arg(long)]
        skills_dir: Option<PathBuf>,

        /// Target tool, e.g. `claude`, `cursor`, `codex`.
        #[arg(long)]
        tool: Option<String>,

        /// Skill to install (repeatable).
        #[arg(long = "skill")]
        skills: Vec<String>,

        /// Skip prompts.
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Import {
            file,
            vectorize_column,
            collection,
            batch_size,
        } => {
            let cfg = config::resolve_config(cli.config.as_deref())?;
            let opts = ImportOptions {
                file,
                vectorize_column,
                collection,
                batch_size: batch_size.unwrap_or(cfg.import.batch_size),
            };
            let (name, count) = import::run_import(&cfg, &opts).await?;
            println!("\nSuccess! Collection '{}' now has {} records.", name, count);
        }
        Commands::Query {
            collection,
            query_text,
            where_json,
            contains,
            semantic,
            get_all,
            limit,
            offset,
            get_ids,
            info,
            list_collections,
            n_results,
            include,
            json,
            output,
            sheet_name,
        } => {
            let cfg = config::resolve_config(cli.config.as_deref())?;
            let opts = QueryOptions {
                collection,
                query_text,
                where_json,
                contains,
                semantic,
                get_all,
                limit,
                offset,
                get_ids,
                info,
                list_collections,
                n_results,
                include,
                json,
                output,
                sheet_name,
            };
            query::run_query(&cfg, &opts).await?;
        }
        // Inspect and install never touch the database config.
        Commands::Inspect {
            file,
            sheet,
            rows,
            list_sheets,
            columns,
            stats,
            to_csv,
            all_rows,
        } => {
            inspect::run_inspect(&InspectOptions {
                file,
                sheet,
                rows,
                list_sheets,
                columns,
                stats,
                to_csv,
                all_rows,
            })?;
        }
        Commands::Catalog {
            base_url,
            api_key,
            model,
            skill_dir,
            docs_dir,
            output,
            branch_map,
            hash_cache,
            concurrency,
            max_chars,
            incremental,
            dry_run,
        } => {
            let cfg = config::resolve_config(cli.config.as_deref())?;
            let opts = CatalogOptions {
                base_url,
                api_key,
                model,
                skill_dir,
                docs_dir,
                output,
                branch_map,
                hash_cache,
                concurrency,
                max_chars,
                incremental,
                dry_run,
            };
            catalog::run_catalog(&cfg, &opts).await?;
        }
        Commands::Install {
            project_root,
            skills_dir,
            tool,
            skills,
            yes,
        } => {
            install::run_install(&InstallOptions {
                project_root,
                skills_dir,
                tool,
                skills,
                yes,
            })?;
        }
    }
    Ok(())
}
