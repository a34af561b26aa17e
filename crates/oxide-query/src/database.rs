//! Database handle and namespace lookup.

use std::fmt;
use std::path::PathBuf;

use sqlx::{AnyConnection, Connection};
use tracing::debug;

use crate::args::Args;
use crate::config::{ConnectionConfig, Driver, FetchMode};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::script::Script;

/// Where printed queries go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrintTarget {
    /// Standard output.
    #[default]
    Stdout,
    /// A `tracing` event at INFO level.
    Log,
}

/// A lazily connected database handle.
///
/// The connection is opened on first use and reused for every query run
/// through this handle. All work happens sequentially on that connection.
pub struct Database {
    config: ConnectionConfig,
    conn: Option<AnyConnection>,
    print: bool,
    print_target: PrintTarget,
}

impl Database {
    /// Creates a handle. No connection is made yet.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        let print = config.print();
        Self {
            config,
            conn: None,
            print,
            print_target: PrintTarget::default(),
        }
    }

    /// The configuration this handle was created from.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The active driver.
    #[must_use]
    pub fn driver(&self) -> Driver {
        self.config.driver()
    }

    /// Default row shape for fetches.
    #[must_use]
    pub fn fetch_mode(&self) -> FetchMode {
        self.config.fetch_mode()
    }

    /// Turns printing of interpolated queries on or off.
    pub fn set_print(&mut self, print: bool) -> &mut Self {
        self.print = print;
        self
    }

    /// Chooses where printed queries go.
    pub fn set_print_target(&mut self, target: PrintTarget) -> &mut Self {
        self.print_target = target;
        self
    }

    /// Whether queries are printed when created.
    #[must_use]
    pub fn print(&self) -> bool {
        self.print
    }

    /// Where printed queries go.
    #[must_use]
    pub fn print_target(&self) -> PrintTarget {
        self.print_target
    }

    /// Whether a connection has been opened.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Returns the connection, opening it on first use.
    ///
    /// # Errors
    ///
    /// Fails if the address is invalid or the database cannot be reached.
    pub async fn connection(&mut self) -> Result<&mut AnyConnection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                sqlx::any::install_default_drivers();
                let url = self.config.connect_url()?;
                debug!(driver = %self.driver(), "Connecting to database");
                AnyConnection::connect(&url).await?
            }
        };
        Ok(self.conn.insert(conn))
    }

    /// Starts a transaction.
    pub async fn begin(&mut self) -> Result<()> {
        let statement = match self.driver() {
            Driver::MySql => "START TRANSACTION",
            Driver::Sqlite | Driver::Postgres => "BEGIN",
        };
        self.raw(statement).await
    }

    /// Commits the open transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.raw("COMMIT").await
    }

    /// Rolls back the open transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        self.raw("ROLLBACK").await
    }

    async fn raw(&mut self, statement: &'static str) -> Result<()> {
        debug!(statement, "Transaction control");
        let conn = self.connection().await?;
        sqlx::raw_sql(statement).execute(conn).await?;
        Ok(())
    }

    /// Creates a query from SQL text and arguments.
    ///
    /// Nothing is executed until one of the fetch or run methods is called.
    pub fn execute(&mut self, sql: impl Into<String>, args: impl Into<Args>) -> Query<'_> {
        Query::new(self, sql.into(), args.into())
    }

    /// Looks up a namespace, a subdirectory of one of the SQL directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NamespaceNotFound`] if no SQL directory contains it.
    pub fn namespace(&self, name: &str) -> Result<Folder> {
        let dirs: Vec<PathBuf> = self
            .config
            .sql_dirs()
            .iter()
            .map(|dir| dir.join(name))
            .filter(|dir| dir.is_dir())
            .collect();
        if dirs.is_empty() {
            return Err(Error::NamespaceNotFound(name.to_string()));
        }
        Ok(Folder {
            namespace: name.to_string(),
            dirs,
        })
    }

    /// Shorthand for `namespace(namespace)?.script(name)`.
    ///
    /// # Errors
    ///
    /// Fails if the namespace or the script cannot be found or read.
    pub fn script(&self, namespace: &str, name: &str) -> Result<Script> {
        self.namespace(namespace)?.script(name)
    }

    /// Closes the connection, if one was opened.
    pub async fn close(self) -> Result<()> {
        if let Some(conn) = self.conn {
            conn.close().await?;
        }
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("driver", &self.driver())
            .field("connected", &self.is_connected())
            .field("print", &self.print)
            .finish_non_exhaustive()
    }
}

/// A namespace: one subdirectory name, present in one or more SQL
/// directories.
#[derive(Debug, Clone)]
pub struct Folder {
    namespace: String,
    dirs: Vec<PathBuf>,
}

impl Folder {
    /// The namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.namespace
    }

    /// Directories holding this namespace, highest precedence first.
    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Loads a script by name.
    ///
    /// Directories are searched in precedence order. Within one directory
    /// `<name>.sql` wins over `<name>.tpql`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptNotFound`] if no directory has the script.
    pub fn script(&self, name: &str) -> Result<Script> {
        for dir in &self.dirs {
            for (extension, template) in [("sql", false), ("tpql", true)] {
                let path = dir.join(format!("{name}.{extension}"));
                if path.is_file() {
                    debug!(path = %path.display(), "Loading script");
                    let source = std::fs::read_to_string(&path)?;
                    return Ok(Script::new(&self.namespace, name, path, source, template));
                }
            }
        }
        Err(Error::ScriptNotFound {
            namespace: self.namespace.clone(),
            script: name.to_string(),
        })
    }
}
