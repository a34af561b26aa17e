//! Connection configuration.
//!
//! A [`ConnectionConfig`] pairs a database address with the ordered SQL and
//! migration directories used to resolve scripts. Directories are resolved
//! to absolute paths when they are added, and identifiers for the migrations
//! tracking table are validated when they are set.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::DirSpec;

/// Namespace used when migration directories are given without one.
pub const DEFAULT_NAMESPACE: &str = "default";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));
static SCHEMA_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_]+\.)?[A-Za-z0-9_]+$").expect("valid regex"));

/// Database backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    #[serde(rename = "pgsql")]
    Postgres,
    /// MySQL and MariaDB.
    MySql,
}

impl Driver {
    /// Every supported driver.
    pub const ALL: [Self; 3] = [Self::Sqlite, Self::Postgres, Self::MySql];

    /// Derives the driver from the scheme of a connection address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDriver`] for unknown schemes.
    pub fn from_address(address: &str) -> Result<Self> {
        let scheme = address.split(':').next().unwrap_or_default();
        match scheme {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pgsql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(Error::UnsupportedDriver(other.to_string())),
        }
    }

    /// The name used in directory mappings and migration filename tags.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "pgsql",
            Self::MySql => "mysql",
        }
    }

    /// Whether DDL statements participate in transactions.
    #[must_use]
    pub const fn supports_transactions(self) -> bool {
        matches!(self, Self::Sqlite | Self::Postgres)
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of the rows returned by fetch operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Object keyed by column name.
    Assoc,
    /// Array indexed by column position.
    Num,
    /// Object keyed by both column name and column position.
    #[default]
    Both,
}

/// Connection descriptor plus script and migration directories.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionConfig {
    address: String,
    driver: Driver,
    #[serde(skip)]
    username: Option<String>,
    #[serde(skip)]
    password: Option<String>,
    options: BTreeMap<String, String>,
    fetch_mode: FetchMode,
    print: bool,
    sql_dirs: Vec<PathBuf>,
    migration_dirs: BTreeMap<String, Vec<PathBuf>>,
    migrations_table: String,
    migrations_column_migration: String,
    migrations_column_applied: String,
}

impl ConnectionConfig {
    /// Creates a configuration for the given address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDriver`] if the address scheme is unknown.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let driver = Driver::from_address(&address)?;
        Ok(Self {
            address,
            driver,
            username: None,
            password: None,
            options: BTreeMap::new(),
            fetch_mode: FetchMode::default(),
            print: false,
            sql_dirs: Vec::new(),
            migration_dirs: BTreeMap::new(),
            migrations_table: "migrations".to_string(),
            migrations_column_migration: "migration".to_string(),
            migrations_column_applied: "applied".to_string(),
        })
    }

    /// Sets the credentials used to connect.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    /// Adds a driver-level connection option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Sets the default row shape.
    #[must_use]
    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    /// Enables printing of interpolated queries.
    #[must_use]
    pub fn with_print(mut self, print: bool) -> Self {
        self.print = print;
        self
    }

    /// Adds SQL directories in front of the existing ones.
    ///
    /// # Errors
    ///
    /// Fails if a directory does not exist or the specification is malformed.
    pub fn add_sql_dirs(&mut self, spec: &DirSpec) -> Result<()> {
        let mut dirs = spec.resolve_for(self.driver.name())?;
        dirs.append(&mut self.sql_dirs);
        self.sql_dirs = dirs;
        Ok(())
    }

    /// Adds migration directories to the default namespace, in front of the
    /// existing ones.
    ///
    /// # Errors
    ///
    /// Fails if a directory does not exist or the specification is malformed.
    pub fn add_migration_dirs(&mut self, spec: &DirSpec) -> Result<()> {
        self.add_namespaced_migration_dirs(DEFAULT_NAMESPACE, spec)
    }

    /// Adds migration directories to `namespace`, in front of the existing
    /// ones.
    ///
    /// # Errors
    ///
    /// Fails if a directory does not exist or the specification is malformed.
    pub fn add_namespaced_migration_dirs(&mut self, namespace: &str, spec: &DirSpec) -> Result<()> {
        let mut dirs = spec.resolve_for(self.driver.name())?;
        let existing = self.migration_dirs.entry(namespace.to_string()).or_default();
        dirs.append(existing);
        *existing = dirs;
        Ok(())
    }

    /// Sets the migrations tracking table name.
    ///
    /// PostgreSQL table names may carry one `schema.` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for names with other characters.
    pub fn set_migrations_table(&mut self, table: impl Into<String>) -> Result<()> {
        let table = table.into();
        let pattern = if self.driver == Driver::Postgres {
            &SCHEMA_IDENTIFIER
        } else {
            &IDENTIFIER
        };
        if !pattern.is_match(&table) {
            return Err(Error::InvalidIdentifier {
                kind: "table",
                name: table,
            });
        }
        self.migrations_table = table;
        Ok(())
    }

    /// Sets the column holding migration names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for invalid column names.
    pub fn set_migrations_column_migration(&mut self, column: impl Into<String>) -> Result<()> {
        self.migrations_column_migration = validate_column(column.into())?;
        Ok(())
    }

    /// Sets the column holding the application timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for invalid column names.
    pub fn set_migrations_column_applied(&mut self, column: impl Into<String>) -> Result<()> {
        self.migrations_column_applied = validate_column(column.into())?;
        Ok(())
    }

    /// The address as configured.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The driver derived from the address.
    #[must_use]
    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Username, if configured.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Driver-level options.
    #[must_use]
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Default row shape.
    #[must_use]
    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    /// Whether queries print their interpolated SQL.
    #[must_use]
    pub fn print(&self) -> bool {
        self.print
    }

    /// SQL directories, highest precedence first.
    #[must_use]
    pub fn sql_dirs(&self) -> &[PathBuf] {
        &self.sql_dirs
    }

    /// Migration directories of the default namespace.
    #[must_use]
    pub fn migration_dirs(&self) -> &[PathBuf] {
        self.migration_dirs
            .get(DEFAULT_NAMESPACE)
            .map_or(&[], Vec::as_slice)
    }

    /// Migration directories by namespace.
    #[must_use]
    pub fn namespaced_migration_dirs(&self) -> &BTreeMap<String, Vec<PathBuf>> {
        &self.migration_dirs
    }

    /// Migrations tracking table name.
    #[must_use]
    pub fn migrations_table(&self) -> &str {
        &self.migrations_table
    }

    /// Column holding migration names.
    #[must_use]
    pub fn migrations_column_migration(&self) -> &str {
        &self.migrations_column_migration
    }

    /// Column holding the application timestamp.
    #[must_use]
    pub fn migrations_column_applied(&self) -> &str {
        &self.migrations_column_applied
    }

    /// Builds the URL handed to the driver, with credentials and options
    /// merged in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if credentials are configured but
    /// the address is not a parseable URL.
    pub fn connect_url(&self) -> Result<String> {
        let mut address = match self.address.split_once(':') {
            Some(("pgsql", rest)) => format!("postgres:{rest}"),
            _ => self.address.clone(),
        };

        if let Some(username) = &self.username {
            let invalid = |source| Error::InvalidAddress {
                address: self.address.clone(),
                source,
            };
            let mut url = url::Url::parse(&address).map_err(invalid)?;
            if !url.cannot_be_a_base() {
                // Only fails for cannot-be-a-base URLs, excluded above.
                let _ = url.set_username(username);
                let _ = url.set_password(self.password.as_deref());
            }
            address = url.to_string();
        }

        if !self.options.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.options)
                .finish();
            let separator = if address.contains('?') { '&' } else { '?' };
            address = format!("{address}{separator}{query}");
        }

        Ok(address)
    }
}

fn validate_column(column: String) -> Result<String> {
    if IDENTIFIER.is_match(&column) {
        Ok(column)
    } else {
        Err(Error::InvalidIdentifier {
            kind: "table column",
            name: column,
        })
    }
}
