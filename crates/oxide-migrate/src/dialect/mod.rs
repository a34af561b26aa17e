//! Database dialect implementations.
//!
//! Each dialect knows how to create and introspect the migrations tracking
//! table on its database system, and whether DDL is transactional there.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use std::fmt;

use oxide_query::{Args, Driver};

use crate::history::TrackingTable;

/// Trait for database-specific tracking-table SQL.
pub trait MigrationDialect: Send + Sync {
    /// Returns the driver name the dialect belongs to.
    fn name(&self) -> &'static str;

    /// Returns whether a batch of migrations can run in one transaction.
    fn supports_transactions(&self) -> bool;

    /// Query returning one row with an `available` count for the table.
    fn table_exists_sql(&self) -> &'static str;

    /// Arguments for [`Self::table_exists_sql`].
    fn table_exists_args(&self, table: &TrackingTable) -> Args {
        Args::named([("table", table.name())])
    }

    /// `CREATE TABLE` statement for the tracking table.
    fn create_table_sql(&self, table: &TrackingTable) -> String;
}

impl fmt::Debug for dyn MigrationDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the dialect for a driver.
#[must_use]
pub fn dialect_for(driver: Driver) -> &'static dyn MigrationDialect {
    match driver {
        Driver::Sqlite => &SqliteDialect,
        Driver::Postgres => &PostgresDialect,
        Driver::MySql => &MySqlDialect,
    }
}

/// Tracking-table DDL for a driver given by name.
///
/// Returns `None` for drivers without a dialect.
#[must_use]
pub fn create_table_sql(driver: &str, table: &TrackingTable) -> Option<String> {
    Driver::ALL
        .into_iter()
        .find(|d| d.name() == driver)
        .map(|d| dialect_for(d).create_table_sql(table))
}
