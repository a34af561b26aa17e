//! File-based SQL migrations for SQLite, PostgreSQL and MySQL.
//!
//! Migrations are files in one or more directories per namespace:
//!
//! - `*.sql` runs as-is,
//! - `*.tpql` is rendered with [`tera`] first (`driver` and `config` in scope),
//! - `*.rs` marks the position of a [`CodeMigration`](registry::CodeMigration)
//!   compiled into the binary and registered under the file stem.
//!
//! Files are applied in file-name order; a name tagged with a driver such as
//! `240101-120000-fulltext-[pgsql].sql` only runs on that driver. Applied
//! names are recorded in a tracking table. On SQLite and PostgreSQL the whole
//! batch runs in one transaction and is rolled back unless `--apply` is
//! given; MySQL applies each migration as it goes.
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_migrate::prelude::*;
//!
//! pub struct SeedUsers;
//!
//! #[async_trait(?Send)]
//! impl CodeMigration for SeedUsers {
//!     async fn run(&self, env: &mut Environment) -> anyhow::Result<()> {
//!         env.db()
//!             .execute("INSERT INTO users (name) VALUES (:name)", Args::named([("name", "admin")]))
//!             .run()
//!             .await?;
//!         Ok(())
//!     }
//! }
//!
//! let registry = MigrationRegistry::new().with("240309-140507-seed-users", SeedUsers);
//! let mut env = Environment::new(ConnectionConfig::new("sqlite://app.db")?);
//! let report = Migrator::new(&registry).apply(true).run(&mut env, &mut std::io::stdout()).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create the tracking table
//! oxide-migrate -d sqlite://app.db -m migrations create-migrations-table
//!
//! # Show what would be applied, then apply it
//! oxide-migrate -d sqlite://app.db -m migrations migrations
//! oxide-migrate -d sqlite://app.db -m migrations migrations --apply
//!
//! # Create a new migration file
//! oxide-migrate -m migrations add-migration -f "add users.sql"
//! ```

pub mod cli;
pub mod commands;
pub mod dialect;
pub mod environment;
pub mod error;
pub mod executor;
pub mod history;
pub mod migration;
pub mod registry;
pub mod settings;

pub use environment::Environment;
pub use error::{MigrateError, Result};
pub use executor::{MigrationReport, MigrationStatus, Migrator};
pub use registry::{CodeMigration, MigrationRegistry};

/// Prelude for convenient imports.
pub mod prelude {
    pub use async_trait::async_trait;
    pub use oxide_query::{Args, ConnectionConfig, Database, FetchMode, Value};

    pub use crate::environment::Environment;
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{MigrationReport, MigrationStatus, Migrator};
    pub use crate::registry::{CodeMigration, MigrationRegistry};
}
