//! TOML configuration.
//!
//! Every section is optional; a missing default config file means
//! built-in defaults. Connection settings can be overridden from the
//! environment (`SEEKDB_HOST`, `SEEKDB_PORT`, `SEEKDB_DATABASE`,
//! `SEEKDB_USER`, `SEEKDB_PASSWORD`, `SEEKDB_PATH`), which is also where
//! a `.env` file loaded at startup ends up.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/seekdb.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbMode {
    /// Local SQLite file.
    #[default]
    Embedded,
    /// seekdb server over the MySQL protocol.
    Server,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default)]
    pub mode: DbMode,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            mode: DbMode::Embedded,
            path: default_db_path(),
            host: None,
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: String::new(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("~/.seekdb/seekdb.sqlite")
}
fn default_port() -> u16 {
    2881
}
fn default_database() -> String {
    "test".to_string()
}
fn default_user() -> String {
    "root".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `openai` and `ollama` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_import_batch_size")]
    pub batch_size: usize,
    /// Dimension of collections created without an embedding function.
    #[serde(default = "default_placeholder_dims")]
    pub placeholder_dims: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_import_batch_size(),
            placeholder_dims: default_placeholder_dims(),
        }
    }
}

fn default_import_batch_size() -> usize {
    100
}
fn default_placeholder_dims() -> usize {
    seekdb_core::models::PLACEHOLDER_DIMENSION
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Retries for rate-limited or failed chat completions.
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            concurrency: default_concurrency(),
            max_chars: default_max_chars(),
            max_retries: default_chat_retries(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}
fn default_max_chars() -> usize {
    8000
}
fn default_chat_retries() -> u32 {
    crate::llm::MAX_RETRIES
}

impl Config {
    /// Apply `SEEKDB_*` overrides using `var` to look up variables.
    ///
    /// A non-empty `SEEKDB_HOST` switches to server mode.
    pub fn apply_env_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("SEEKDB_HOST") {
            self.db.host = Some(host);
            self.db.mode = DbMode::Server;
        }
        if let Some(port) = get("SEEKDB_PORT") {
            self.db.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid SEEKDB_PORT: '{}'", port))?;
        }
        if let Some(database) = get("SEEKDB_DATABASE") {
            self.db.database = database;
        }
        if let Some(user) = get("SEEKDB_USER") {
            self.db.user = user;
        }
        if let Some(password) = var("SEEKDB_PASSWORD") {
            self.db.password = password;
        }
        if let Some(path) = get("SEEKDB_PATH") {
            self.db.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// SQLite path with a leading `~` expanded to the home directory.
    pub fn db_path(&self) -> PathBuf {
        expand_home(&self.db.path)
    }

    fn validate(&self) -> Result<()> {
        if self.db.mode == DbMode::Server && self.db.host.is_none() {
            bail!("db.host must be set when db.mode is 'server'");
        }
        if self.db.port == 0 {
            bail!("db.port must be > 0");
        }

        if self.import.batch_size == 0 {
            bail!("import.batch_size must be > 0");
        }
        if self.import.placeholder_dims == 0 {
            bail!("import.placeholder_dims must be > 0");
        }

        if self.catalog.concurrency == 0 {
            bail!("catalog.concurrency must be > 0");
        }
        if self.catalog.max_chars == 0 {
            bail!("catalog.max_chars must be > 0");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
                other
            ),
        }

        Ok(())
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Read and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Resolve the effective configuration.
///
/// An explicit `--config` path must exist. Without one, the default path
/// is used when present and built-in defaults otherwise. Environment
/// overrides are applied last.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => load_config(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_config(default)?
            } else {
                Config::default()
            }
        }
    };
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("seekdb.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let (_tmp, path) = write_config("");
        let config = load_config(&path).unwrap();
        assert_eq!(config.db.mode, DbMode::Embedded);
        assert_eq!(config.db.port, 2881);
        assert_eq!(config.db.database, "test");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.import.batch_size, 100);
        assert_eq!(config.import.placeholder_dims, 384);
        assert_eq!(config.catalog.concurrency, 5);
        assert_eq!(config.catalog.max_chars, 8000);
        assert_eq!(config.catalog.max_retries, 3);
    }

    #[test]
    fn test_full_config_parses() {
        let (_tmp, path) = write_config(
            r#"
[db]
mode = "server"
host = "127.0.0.1"
port = 2882
database = "demo"

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536
url = "http://localhost:8080/v1"

[import]
batch_size = 50

[catalog]
model = "gpt-4o-mini"
concurrency = 2
max_retries = 0
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.db.mode, DbMode::Server);
        assert_eq!(config.db.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.embedding.dims, Some(1536));
        assert_eq!(config.import.batch_size, 50);
        assert_eq!(config.catalog.concurrency, 2);
        assert_eq!(config.catalog.max_retries, 0);
    }

    #[test]
    fn test_validation_errors() {
        let (_tmp, path) = write_config("[import]\nbatch_size = 0\n");
        assert!(load_config(&path)
            .unwrap_err()
            .to_string()
            .contains("import.batch_size"));

        let (_tmp, path) = write_config("[embedding]\nprovider = \"openai\"\n");
        assert!(load_config(&path).is_err());

        let (_tmp, path) = write_config("[embedding]\nprovider = \"magic\"\n");
        assert!(load_config(&path)
            .unwrap_err()
            .to_string()
            .contains("Unknown embedding provider"));

        let (_tmp, path) = write_config("[db]\nmode = \"server\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let err = resolve_config(Some(Path::new("/nonexistent/seekdb.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_env_overrides_switch_to_server_mode() {
        let env: HashMap<&str, &str> = [
            ("SEEKDB_HOST", "db.internal"),
            ("SEEKDB_PORT", "3306"),
            ("SEEKDB_USER", "admin"),
            ("SEEKDB_PASSWORD", ""),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.db.mode, DbMode::Server);
        assert_eq!(config.db.host.as_deref(), Some("db.internal"));
        assert_eq!(config.db.port, 3306);
        assert_eq!(config.db.user, "admin");
        assert_eq!(config.db.password, "");
    }

    #[test]
    fn test_empty_host_keeps_embedded_mode() {
        let mut config = Config::default();
        config
            .apply_env_overrides(|k| (k == "SEEKDB_HOST").then(|| "  ".to_string()))
            .unwrap();
        assert_eq!(config.db.mode, DbMode::Embedded);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(|k| (k == "SEEKDB_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SEEKDB_PORT"));
    }

    #[test]
    fn test_expand_home() {
        let plain = expand_home(Path::new("/tmp/x.sqlite"));
        assert_eq!(plain, PathBuf::from("/tmp/x.sqlite"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/.seekdb/a")), home.join(".seekdb/a"));
        }
    }
}
