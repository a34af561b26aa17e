//! SQLite dialect for migrations.
//!
//! SQLite has no length-limited text type, so the tracking table enforces
//! value shapes with `CHECK(typeof(...))` constraints.

use crate::history::TrackingTable;

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT count(*) AS available FROM sqlite_master WHERE type = 'table' AND name = :table"
    }

    fn create_table_sql(&self, table: &TrackingTable) -> String {
        let migration = table.column_migration();
        let applied = table.column_applied();
        format!(
            "CREATE TABLE {name} (
    {migration} text NOT NULL,
    {applied} text DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY ({migration}),
    CHECK(typeof(\"{migration}\") = 'text' AND length(\"{migration}\") <= 256),
    CHECK(typeof(\"{applied}\") = 'text' AND length(\"{applied}\") = 19)
);",
            name = table.name(),
        )
    }
}
