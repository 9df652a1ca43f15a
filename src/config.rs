//! Configuration file handling.
//!
//! The configuration file is stored at `$STATEMENT_ETL_HOME/config.json` and holds the statement
//! API endpoints, the table statement rows are reloaded into, and the fund administrator whose
//! reference names are used. The SQLite ledger and the staging directory live next to it.

use crate::db::{Db, TableName};
use crate::model::Cnpj;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "statement-etl";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const STAGING: &str = ".staging";
const LEDGER_SQLITE: &str = "ledger.sqlite";
const REQUEST_TIMEOUT_SECS: u64 = 20;

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$STATEMENT_ETL_HOME` and from there it loads `config.json`. It provides the opened
/// database and the paths of the other items expected within the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    auth_url: Url,
    graphql_url: Url,
    db: Db,
    staging: PathBuf,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory, its staging directory and:
    /// - Writes an initial `config.json` with the given endpoints and default settings
    /// - Creates and migrates the SQLite ledger
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of the home directory
    /// - `auth_url` - The endpoint that exchanges the API token and login for a bearer credential
    /// - `graphql_url` - The endpoint that serves cash statements
    /// - `administrator` - The fund administrator whose reference names are looked up
    /// - `target_table` - The table statement rows are reloaded into
    ///
    /// # Errors
    /// - Returns an error if a URL is invalid, a database already exists, or any file operation
    ///   fails.
    pub async fn create(
        dir: impl Into<PathBuf>,
        auth_url: &str,
        graphql_url: &str,
        administrator: Cnpj,
        target_table: TableName,
    ) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_file = ConfigFile {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            auth_url: auth_url.to_string(),
            graphql_url: graphql_url.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            target_table,
            administrator_cnpj: administrator,
            staging_path: None,
            sqlite_path: None,
        };
        let (auth_url, graphql_url) = config_file.urls()?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!(
                "A config file already exists at '{}'",
                config_path.display()
            );
        }

        let staging = resolve(&root, config_file.staging_path());
        utils::make_dir(&staging).await?;

        let sqlite_path = resolve(&root, config_file.sqlite_path());
        let db = Db::init(&sqlite_path, config_file.administrator_cnpj.clone())
            .await
            .context("Unable to create SQLite DB")?;

        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            config_path,
            config_file,
            auth_url,
            graphql_url,
            db,
            staging,
            sqlite_path,
        })
    }

    /// This will
    /// - validate that the home directory and the config file exist
    /// - load the config file and validate its URLs
    /// - open the SQLite ledger, migrating it if needed
    /// - create the staging directory if it is missing
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The home directory is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;
        let (auth_url, graphql_url) = config_file.urls()?;

        let sqlite_path = resolve(&root, config_file.sqlite_path());
        let db = Db::load(&sqlite_path, config_file.administrator_cnpj.clone())
            .await
            .context("Unable to load SQLite DB")?;

        let staging = resolve(&root, config_file.staging_path());
        utils::make_dir(&staging).await?;

        Ok(Self {
            root,
            config_path,
            config_file,
            auth_url,
            graphql_url,
            db,
            staging,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    pub fn graphql_url(&self) -> &Url {
        &self.graphql_url
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.request_timeout_secs)
    }

    pub fn target_table(&self) -> &TableName {
        &self.config_file.target_table
    }

    pub fn administrator_cnpj(&self) -> &Cnpj {
        &self.config_file.administrator_cnpj
    }
}

/// Returns `p` unchanged if it is absolute, otherwise resolves it against `root`.
fn resolve(root: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        return p;
    }
    root.join(p)
}

fn default_timeout() -> u64 {
    REQUEST_TIMEOUT_SECS
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "statement-etl",
///   "config_version": 1,
///   "auth_url": "https://apis.example.com/login/api/user/AuthUserApi",
///   "graphql_url": "https://apis.example.com/frontier/graphql",
///   "request_timeout_secs": 20,
///   "target_table": "account_movements",
///   "administrator_cnpj": "22610500000188",
///   "staging_path": ".staging",
///   "sqlite_path": "ledger.sqlite"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "statement-etl"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Endpoint that exchanges the API token and login for a bearer credential
    auth_url: String,

    /// GraphQL endpoint that serves cash statements
    graphql_url: String,

    /// Timeout of a single statement request, in seconds
    #[serde(default = "default_timeout")]
    request_timeout_secs: u64,

    /// The table statement rows are reloaded into
    #[serde(default)]
    target_table: TableName,

    /// The fund administrator whose reference names are used
    administrator_cnpj: Cnpj,

    /// Staging directory (optional, relative to the home directory or absolute)
    /// Defaults to $STATEMENT_ETL_HOME/.staging if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    staging_path: Option<PathBuf>,

    /// SQLite ledger file (optional, relative to the home directory or absolute)
    /// Defaults to $STATEMENT_ETL_HOME/ledger.sqlite if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    sqlite_path: Option<PathBuf>,
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or names another application
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = utils::read(path).await?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }

    fn urls(&self) -> Result<(Url, Url)> {
        let auth = Url::parse(&self.auth_url)
            .with_context(|| format!("Invalid auth_url '{}'", self.auth_url))?;
        let graphql = Url::parse(&self.graphql_url)
            .with_context(|| format!("Invalid graphql_url '{}'", self.graphql_url))?;
        Ok((auth, graphql))
    }

    pub fn staging_path(&self) -> PathBuf {
        self.staging_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(STAGING))
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(LEDGER_SQLITE))
    }
}
