//! MySQL dialect for migrations.
//!
//! DDL statements commit implicitly on MySQL, so a batch cannot be rolled
//! back as a whole.

use crate::history::TrackingTable;

use super::MigrationDialect;

/// MySQL and MariaDB migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MigrationDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT count(*) AS available FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name = :table"
    }

    fn create_table_sql(&self, table: &TrackingTable) -> String {
        let migration = table.column_migration();
        let applied = table.column_applied();
        format!(
            "CREATE TABLE {name} (
    {migration} varchar(256) NOT NULL,
    {applied} timestamp DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY ({migration})
);",
            name = table.name(),
        )
    }
}
