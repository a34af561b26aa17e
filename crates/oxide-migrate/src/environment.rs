//! Migration environment.
//!
//! Bundles the database handle with the tracking-table settings of one
//! connection. Code migrations receive it to run their queries.

use std::collections::HashSet;

use oxide_query::{ConnectionConfig, Database, Driver};

use crate::error::Result;
use crate::history::{MigrationHistory, TrackingTable};

/// Database handle plus migration settings for one connection.
#[derive(Debug)]
pub struct Environment {
    db: Database,
    history: MigrationHistory,
    show_stacktrace: bool,
}

impl Environment {
    /// Creates an environment. The database is connected lazily.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        let history = MigrationHistory::new(TrackingTable::from_config(&config), config.driver());
        Self {
            db: Database::new(config),
            history,
            show_stacktrace: false,
        }
    }

    /// Prints full error chains when a step fails.
    #[must_use]
    pub fn with_stacktrace(mut self, show: bool) -> Self {
        self.show_stacktrace = show;
        self
    }

    /// The database handle.
    pub fn db(&mut self) -> &mut Database {
        &mut self.db
    }

    /// The connection configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        self.db.config()
    }

    /// The active driver.
    #[must_use]
    pub fn driver(&self) -> Driver {
        self.db.driver()
    }

    /// The tracking table.
    #[must_use]
    pub fn table(&self) -> &TrackingTable {
        self.history.table()
    }

    /// Whether error chains are printed.
    #[must_use]
    pub fn show_stacktrace(&self) -> bool {
        self.show_stacktrace
    }

    /// Whether the driver runs a batch in one transaction.
    #[must_use]
    pub fn supports_transactions(&self) -> bool {
        self.history.dialect().supports_transactions()
    }

    /// `CREATE TABLE` statement for the tracking table, if the driver has one.
    #[must_use]
    pub fn migrations_table_ddl(&self) -> Option<String> {
        crate::dialect::create_table_sql(self.driver().name(), self.table())
    }

    /// Checks whether the tracking table exists.
    pub async fn migrations_table_exists(&mut self) -> Result<bool> {
        self.history.table_exists(&mut self.db).await
    }

    /// Creates the tracking table.
    pub async fn create_migrations_table(&mut self) -> Result<()> {
        self.history.create_table(&mut self.db).await
    }

    /// Names of the applied migrations.
    pub async fn applied_migrations(&mut self) -> Result<HashSet<String>> {
        self.history.applied(&mut self.db).await
    }

    /// Records a migration as applied.
    pub async fn record_migration(&mut self, name: &str) -> Result<()> {
        self.history.record_applied(&mut self.db, name).await
    }
}
