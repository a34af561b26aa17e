//! Namespaced SQL script files executed as parameterized queries.
//!
//! `oxide-query` keeps SQL out of Rust source. Scripts live in plain files
//! grouped by namespace directory and are looked up by name at runtime:
//!
//! - **Config** - connection address plus ordered SQL and migration
//!   directories, with per-driver directory mappings
//! - **Database** - a lazily opened connection, namespaces and scripts
//! - **Query** - argument binding, result shaping and debug interpolation
//! - **Templates** - `*.tpql` scripts rendered with `tera` before binding
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_query::prelude::*;
//!
//! let mut config = ConnectionConfig::new("sqlite://app.db")?;
//! config.add_sql_dirs(&DirSpec::from("sql"))?;
//! let mut db = Database::new(config);
//!
//! // sql/members/by_year.sql:
//! //   SELECT name FROM members WHERE joined >= :from AND joined <= :to
//! let script = db.script("members", "by_year")?;
//! let rows = script
//!     .invoke(&mut db, Args::named([("from", 1990), ("to", 1995)]))?
//!     .all(Some(FetchMode::Assoc))
//!     .await?;
//! ```
//!
//! # Directory precedence
//!
//! Directories registered later are searched first. A driver mapping such
//! as `{"sqlite": "sql/sqlite", "all": "sql/common"}` contributes the
//! driver directory ahead of the catch-all, so driver-specific scripts
//! shadow portable ones of the same name.

pub mod args;
pub mod config;
pub mod database;
pub mod error;
pub mod lexer;
pub mod path;
pub mod query;
pub mod script;
pub mod template;

pub use args::{ArgType, Args, Value};
pub use config::{ConnectionConfig, Driver, FetchMode, DEFAULT_NAMESPACE};
pub use database::{Database, Folder, PrintTarget};
pub use error::{Error, ErrorCategory, Result};
pub use path::DirSpec;
pub use query::Query;
pub use script::Script;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::args::{ArgType, Args, Value};
    pub use crate::config::{ConnectionConfig, Driver, FetchMode};
    pub use crate::database::{Database, Folder, PrintTarget};
    pub use crate::error::{Error, Result};
    pub use crate::path::DirSpec;
    pub use crate::query::Query;
    pub use crate::script::Script;
}
