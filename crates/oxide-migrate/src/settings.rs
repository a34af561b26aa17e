//! Settings file with named connections.
//!
//! ```toml
//! [connections.default]
//! address = "sqlite://app.db"
//! sql = ["sql/common", { sqlite = "sql/sqlite", all = "sql/all" }]
//! migrations = "migrations"
//!
//! [connections.default.namespaced_migrations]
//! billing = "billing/migrations"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use oxide_query::{ConnectionConfig, DirSpec, FetchMode};
use serde::Deserialize;

use crate::error::{MigrateError, Result};

/// Default settings file name.
pub const SETTINGS_FILE: &str = "oxide-sql.toml";

/// Default connection name.
pub const DEFAULT_CONNECTION: &str = "default";

/// Parsed settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Connections by name.
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionSettings>,
    #[serde(skip)]
    base_dir: PathBuf,
}

/// One `[connections.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSettings {
    /// Connection address; its scheme selects the driver.
    pub address: String,
    /// Username merged into the address.
    pub username: Option<String>,
    /// Password merged into the address.
    pub password: Option<String>,
    /// Driver options, appended as query parameters.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Default row shape.
    pub fetch_mode: Option<FetchMode>,
    /// Print interpolated queries.
    #[serde(default)]
    pub print: bool,
    /// SQL directories: a path, a driver mapping or a list of those.
    pub sql: Option<toml::Value>,
    /// Migration directories of the default namespace.
    pub migrations: Option<toml::Value>,
    /// Migration directories by namespace.
    #[serde(default)]
    pub namespaced_migrations: BTreeMap<String, toml::Value>,
    /// Tracking table name.
    pub migrations_table: Option<String>,
    /// Tracking column for migration names.
    pub migrations_column_migration: Option<String>,
    /// Tracking column for timestamps.
    pub migrations_column_applied: Option<String>,
}

impl Settings {
    /// Loads a settings file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        Self::parse(&content, base_dir).map_err(|source| MigrateError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses settings, resolving relative paths against `base_dir`.
    ///
    /// # Errors
    ///
    /// Fails if `content` is not valid TOML or has unknown keys.
    pub fn parse(content: &str, base_dir: impl Into<PathBuf>) -> std::result::Result<Self, toml::de::Error> {
        let mut settings: Self = toml::from_str(content)?;
        settings.base_dir = base_dir.into();
        Ok(settings)
    }

    /// Builds the configuration of a named connection.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::ConnectionNotFound`] for unknown names and
    /// configuration errors for bad directories or identifiers.
    pub fn connection(&self, name: &str) -> Result<ConnectionConfig> {
        let settings = self
            .connections
            .get(name)
            .ok_or_else(|| MigrateError::ConnectionNotFound(name.to_string()))?;

        let mut config = ConnectionConfig::new(&settings.address)?
            .with_print(settings.print)
            .with_fetch_mode(settings.fetch_mode.unwrap_or_default());
        if let Some(username) = &settings.username {
            config = config.with_credentials(username, settings.password.clone());
        }
        for (key, value) in &settings.options {
            config = config.with_option(key, value);
        }

        if let Some(sql) = &settings.sql {
            config.add_sql_dirs(&self.dir_spec(sql)?)?;
        }
        if let Some(migrations) = &settings.migrations {
            config.add_migration_dirs(&self.dir_spec(migrations)?)?;
        }
        for (namespace, dirs) in &settings.namespaced_migrations {
            config.add_namespaced_migration_dirs(namespace, &self.dir_spec(dirs)?)?;
        }

        if let Some(table) = &settings.migrations_table {
            config.set_migrations_table(table)?;
        }
        if let Some(column) = &settings.migrations_column_migration {
            config.set_migrations_column_migration(column)?;
        }
        if let Some(column) = &settings.migrations_column_applied {
            config.set_migrations_column_applied(column)?;
        }

        Ok(config)
    }

    fn dir_spec(&self, value: &toml::Value) -> Result<DirSpec> {
        let spec = DirSpec::from_value(&serde_json::to_value(value)?)?;
        Ok(rebase(spec, &self.base_dir))
    }
}

/// Resolves relative paths in `spec` against `base`.
fn rebase(spec: DirSpec, base: &Path) -> DirSpec {
    match spec {
        DirSpec::Path(path) => DirSpec::Path(base.join(path)),
        DirSpec::ByDriver(map) => DirSpec::ByDriver(
            map.into_iter()
                .map(|(driver, path)| (driver, base.join(path)))
                .collect(),
        ),
        DirSpec::List(entries) => {
            DirSpec::List(entries.into_iter().map(|e| rebase(e, base)).collect())
        }
    }
}
