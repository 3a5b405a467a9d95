/// `load_config` module: Loads a static YAML config, injects secrets from the environment,
/// and adapts both into the core [`SyncConfig`] plus the adapter settings.
///
/// This module is the only place where untrusted YAML is parsed.
///
/// # Responsibilities
/// - Parse the YAML file into type-safe structs, filling defaults for optional keys
/// - Read the drop directory credentials (`DROP_USER`, `DROP_PASSWORD`) from the environment
/// - Let `DATABASE_URL` override `database.url`, and pick the backend from its scheme
/// - Compile the remote file pattern once, so a bad pattern fails before any connection
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path, key or variable in the message,
/// and are surfaced at the CLI boundary.
use crate::store::DatabaseKind;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use settlement_sync_core::config::{SyncConfig, TableTargets, DEFAULT_FILE_PATTERN};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const DROP_USER_ENV: &str = "DROP_USER";
pub const DROP_PASSWORD_ENV: &str = "DROP_PASSWORD";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub remote: RemoteSection,
    pub credentials: DropCredentials,
    pub archive_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub database: DatabaseSection,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RemoteSection {
    pub host: String,
    pub port: u16,
    pub directory: String,
    pub file_pattern: Regex,
}

#[derive(Clone)]
pub struct DropCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DropCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSection {
    pub url: String,
    pub kind: DatabaseKind,
    pub tables: TableTargets,
}

impl CliConfig {
    /// The part of the configuration the core pipeline sees.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(
            &self.staging_dir,
            self.remote.file_pattern.clone(),
            self.database.tables.clone(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    remote: RawRemote,
    archive_dir: PathBuf,
    staging_dir: PathBuf,
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawRemote {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_directory")]
    directory: String,
    #[serde(default = "default_file_pattern")]
    file_pattern: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    transactions_table: Option<String>,
    #[serde(default)]
    summary_table: Option<String>,
}

fn default_port() -> u16 {
    21
}

fn default_directory() -> String {
    "Saida".to_string()
}

fn default_file_pattern() -> String {
    DEFAULT_FILE_PATTERN.to_string()
}

fn required_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        Ok(_) | Err(_) => {
            error!(variable = name, "Required environment variable missing");
            Err(anyhow!("environment variable {name} must be set"))
        }
    }
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let file_pattern = Regex::new(&raw.remote.file_pattern).with_context(|| {
        format!(
            "remote.file_pattern '{}' is not a valid regular expression",
            raw.remote.file_pattern
        )
    })?;

    let credentials = DropCredentials {
        user: required_env(DROP_USER_ENV)?,
        password: required_env(DROP_PASSWORD_ENV)?,
    };

    let url = match env::var(DATABASE_URL_ENV) {
        Ok(url) if !url.is_empty() => {
            info!("Using database URL from {DATABASE_URL_ENV}");
            url
        }
        _ => raw.database.url.ok_or_else(|| {
            error!("No database URL configured");
            anyhow!("database.url must be set in the config file or via {DATABASE_URL_ENV}")
        })?,
    };

    let kind = DatabaseKind::from_url(&url).context("database URL")?;

    let defaults = TableTargets::default();
    let tables = TableTargets {
        schema: raw
            .database
            .schema
            .unwrap_or_else(|| kind.default_schema().to_string()),
        transactions_table: raw
            .database
            .transactions_table
            .unwrap_or(defaults.transactions_table),
        summary_table: raw.database.summary_table.unwrap_or(defaults.summary_table),
    };

    let config = CliConfig {
        remote: RemoteSection {
            host: raw.remote.host,
            port: raw.remote.port,
            directory: raw.remote.directory,
            file_pattern,
        },
        credentials,
        archive_dir: raw.archive_dir,
        staging_dir: raw.staging_dir,
        database: DatabaseSection { url, kind, tables },
        log_dir: raw.log_dir,
    };
    info!(
        host = %config.remote.host,
        port = config.remote.port,
        directory = %config.remote.directory,
        archive_dir = %config.archive_dir.display(),
        backend = ?config.database.kind,
        schema = %config.database.tables.schema,
        "Configuration loaded"
    );
    Ok(config)
}

/// Reads only `log_dir` from the config file, so logging can be set up before the full
/// load. Any problem yields `None`; the full load reports it.
pub fn peek_log_dir(path: &Path) -> Option<PathBuf> {
    #[derive(Deserialize)]
    struct LogOnly {
        #[serde(default)]
        log_dir: Option<PathBuf>,
    }

    let content = fs::read_to_string(path).ok()?;
    serde_yaml::from_str::<LogOnly>(&content).ok()?.log_dir
}
