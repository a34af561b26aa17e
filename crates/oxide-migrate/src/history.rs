//! Migration history tracking.
//!
//! This module manages the tracking table that records which migrations
//! have been applied to the database. Table and column names come from the
//! connection configuration, which validates them as plain identifiers.

use std::collections::HashSet;

use oxide_query::{Args, ConnectionConfig, Database, Driver, FetchMode};

use crate::dialect::{dialect_for, MigrationDialect};
use crate::error::Result;

/// Location and column names of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingTable {
    schema: Option<String>,
    name: String,
    column_migration: String,
    column_applied: String,
}

impl TrackingTable {
    /// Creates a table description.
    pub fn new(
        schema: Option<String>,
        name: impl Into<String>,
        column_migration: impl Into<String>,
        column_applied: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            name: name.into(),
            column_migration: column_migration.into(),
            column_applied: column_applied.into(),
        }
    }

    /// Reads the table description from a connection configuration.
    ///
    /// On PostgreSQL a `schema.table` name is split into its parts.
    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let configured = config.migrations_table();
        let (schema, name) = match configured.split_once('.') {
            Some((schema, name)) if config.driver() == Driver::Postgres => {
                (Some(schema.to_string()), name)
            }
            _ => (None, configured),
        };
        Self::new(
            schema,
            name,
            config.migrations_column_migration(),
            config.migrations_column_applied(),
        )
    }

    /// Schema, if one was given.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Table name without schema.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name as used in queries, with schema if one was given.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Column holding migration file names.
    #[must_use]
    pub fn column_migration(&self) -> &str {
        &self.column_migration
    }

    /// Column holding the application timestamp.
    #[must_use]
    pub fn column_applied(&self) -> &str {
        &self.column_applied
    }
}

/// Manages the migration history in the database.
#[derive(Debug, Clone)]
pub struct MigrationHistory {
    table: TrackingTable,
    dialect: &'static dyn MigrationDialect,
}

impl MigrationHistory {
    /// Creates a history manager for a driver.
    #[must_use]
    pub fn new(table: TrackingTable, driver: Driver) -> Self {
        Self {
            table,
            dialect: dialect_for(driver),
        }
    }

    /// The tracking table.
    #[must_use]
    pub fn table(&self) -> &TrackingTable {
        &self.table
    }

    /// The dialect in use.
    #[must_use]
    pub fn dialect(&self) -> &'static dyn MigrationDialect {
        self.dialect
    }

    /// `CREATE TABLE` statement for the tracking table.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        self.dialect.create_table_sql(&self.table)
    }

    /// Checks whether the tracking table exists.
    pub async fn table_exists(&self, db: &mut Database) -> Result<bool> {
        let row = db
            .execute(
                self.dialect.table_exists_sql(),
                self.dialect.table_exists_args(&self.table),
            )
            .one(Some(FetchMode::Assoc))
            .await?;
        let available = row
            .as_ref()
            .and_then(|r| r.get("available"))
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0);
        Ok(available > 0)
    }

    /// Creates the tracking table.
    pub async fn create_table(&self, db: &mut Database) -> Result<()> {
        db.execute(self.create_table_sql(), ()).run().await?;
        Ok(())
    }

    /// Gets the names of all applied migrations.
    pub async fn applied(&self, db: &mut Database) -> Result<HashSet<String>> {
        let sql = format!(
            "SELECT {} FROM {}",
            self.table.column_migration(),
            self.table.qualified_name()
        );
        let rows = db.execute(sql, ()).all(Some(FetchMode::Num)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(0).and_then(serde_json::Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Records a migration as applied.
    pub async fn record_applied(&self, db: &mut Database, migration: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (:migration)",
            self.table.qualified_name(),
            self.table.column_migration()
        );
        db.execute(sql, Args::named([("migration", migration)]))
            .run()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> (MigrationHistory, Database) {
        let config = ConnectionConfig::new("sqlite::memory:").unwrap();
        let table = TrackingTable::from_config(&config);
        (
            MigrationHistory::new(table, config.driver()),
            Database::new(config),
        )
    }

    #[test]
    fn test_schema_split_only_on_postgres() {
        let mut config = ConnectionConfig::new("pgsql://localhost/app").unwrap();
        config.set_migrations_table("audit.log").unwrap();
        let table = TrackingTable::from_config(&config);
        assert_eq!(table.schema(), Some("audit"));
        assert_eq!(table.name(), "log");
        assert_eq!(table.qualified_name(), "audit.log");

        let config = ConnectionConfig::new("sqlite::memory:").unwrap();
        let table = TrackingTable::from_config(&config);
        assert_eq!(table.schema(), None);
        assert_eq!(table.qualified_name(), "migrations");
    }

    #[tokio::test]
    async fn test_create_table() {
        let (history, mut db) = history();
        assert!(!history.table_exists(&mut db).await.unwrap());
        history.create_table(&mut db).await.unwrap();
        assert!(history.table_exists(&mut db).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_and_list_applied() {
        let (history, mut db) = history();
        history.create_table(&mut db).await.unwrap();
        assert!(history.applied(&mut db).await.unwrap().is_empty());

        history
            .record_applied(&mut db, "000-initial.sql")
            .await
            .unwrap();
        history
            .record_applied(&mut db, "001-users.rs")
            .await
            .unwrap();

        let applied = history.applied(&mut db).await.unwrap();
        assert_eq!(applied.len(), 2);
        assert!(applied.contains("001-users.rs"));
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected() {
        let (history, mut db) = history();
        history.create_table(&mut db).await.unwrap();
        history.record_applied(&mut db, "000-a.sql").await.unwrap();
        assert!(history.record_applied(&mut db, "000-a.sql").await.is_err());
    }
}
