//! PostgreSQL dialect for migrations.
//!
//! The tracking table may live in a schema other than `public`; existence
//! checks look it up in `pg_tables` by schema and table name.

use oxide_query::Args;

use crate::history::TrackingTable;

use super::MigrationDialect;

/// Schema used when the table name carries none.
pub const DEFAULT_SCHEMA: &str = "public";

/// PostgreSQL migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl MigrationDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT count(*) AS available FROM pg_tables WHERE schemaname = :schema AND tablename = :table"
    }

    fn table_exists_args(&self, table: &TrackingTable) -> Args {
        Args::named([
            ("schema", table.schema().unwrap_or(DEFAULT_SCHEMA)),
            ("table", table.name()),
        ])
    }

    fn create_table_sql(&self, table: &TrackingTable) -> String {
        let migration = table.column_migration();
        let applied = table.column_applied();
        format!(
            "CREATE TABLE {schema}.{name} (
    {migration} text NOT NULL CHECK (char_length({migration}) <= 256),
    {applied} timestamp with time zone DEFAULT now() NOT NULL,
    CONSTRAINT pk_{name} PRIMARY KEY ({migration})
);",
            schema = table.schema().unwrap_or(DEFAULT_SCHEMA),
            name = table.name(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_default_schema() {
        let table = TrackingTable::new(None, "migrations", "migration", "applied");
        let sql = PostgresDialect.create_table_sql(&table);
        assert!(sql.starts_with("CREATE TABLE public.migrations ("));
        assert!(sql.contains("CHECK (char_length(migration) <= 256)"));
        assert!(sql.contains("CONSTRAINT pk_migrations PRIMARY KEY (migration)"));
    }

    #[test]
    fn test_create_table_with_schema() {
        let table = TrackingTable::new(Some("audit".into()), "log", "migration", "applied");
        let sql = PostgresDialect.create_table_sql(&table);
        assert!(sql.starts_with("CREATE TABLE audit.log ("));
        assert!(sql.contains("CONSTRAINT pk_log"));

        let args = PostgresDialect.table_exists_args(&table);
        assert_eq!(args, Args::named([("schema", "audit"), ("table", "log")]));
    }
}
