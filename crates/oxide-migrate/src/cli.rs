//! Command-line interface.
//!
//! The binary ships an empty [`MigrationRegistry`]. Projects with code
//! migrations build their own binary around [`run`]:
//!
//! ```rust,ignore
//! use clap::Parser;
//! use oxide_migrate::cli::{self, Cli};
//! use oxide_migrate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<std::process::ExitCode> {
//!     let registry = MigrationRegistry::new().with("240309-140507-seed-users", SeedUsers);
//!     let code = cli::run(Cli::parse(), &registry, &mut std::io::stdout()).await?;
//!     Ok(code.into())
//! }
//! ```

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use oxide_query::{ConnectionConfig, DirSpec};
use tracing::debug;

use crate::commands;
use crate::environment::Environment;
use crate::registry::MigrationRegistry;
use crate::settings::{Settings, DEFAULT_CONNECTION, SETTINGS_FILE};

/// SQL migrations for SQLite, PostgreSQL and MySQL.
#[derive(Debug, Parser)]
#[command(name = "oxide-migrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file with named connections (default: ./oxide-sql.toml if present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Connection to use from the settings file.
    #[arg(long, global = true, default_value = DEFAULT_CONNECTION)]
    pub conn: String,

    /// Database URL, used when no settings file is found.
    #[arg(short, long, global = true, env = "DATABASE_URL")]
    pub database: Option<String>,

    /// Additional SQL directory, highest precedence first.
    #[arg(long = "sql-dir", global = true)]
    pub sql_dirs: Vec<PathBuf>,

    /// Additional migrations directory, highest precedence first.
    #[arg(short, long = "migrations-dir", global = true)]
    pub migrations_dirs: Vec<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the full error chain when something fails.
    #[arg(long, global = true)]
    pub stacktrace: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the migrations tracking table.
    CreateMigrationsTable,

    /// Apply missing migrations (test run unless --apply is given).
    Migrations {
        /// Commit the migrations instead of rolling them back.
        #[arg(long)]
        apply: bool,
    },

    /// Create a new migration file.
    AddMigration {
        /// Name of the migration; `.sql`, `.tpql` or `.rs` (default `.sql`).
        #[arg(short, long)]
        file: Option<String>,

        /// Migration namespace.
        #[arg(long, default_value = oxide_query::DEFAULT_NAMESPACE)]
        namespace: String,
    },
}

impl Cli {
    /// Builds the connection configuration from the settings file or the
    /// command-line flags.
    ///
    /// # Errors
    ///
    /// Fails if the settings file is invalid, the connection is unknown, no
    /// database is given, or a directory does not exist.
    pub fn connection_config(&self) -> anyhow::Result<ConnectionConfig> {
        let settings_path = self.config.clone().or_else(|| {
            let default = Path::new(SETTINGS_FILE);
            default.is_file().then(|| default.to_path_buf())
        });

        let mut config = match (settings_path, &self.database) {
            (Some(path), _) => {
                debug!(path = %path.display(), connection = %self.conn, "Loading settings");
                Settings::load(&path)?.connection(&self.conn)?
            }
            (None, Some(url)) => ConnectionConfig::new(url.as_str())?,
            (None, None) => anyhow::bail!(
                "No database configured. Pass --database, set DATABASE_URL or create {SETTINGS_FILE}"
            ),
        };

        if !self.sql_dirs.is_empty() {
            config.add_sql_dirs(&dir_list(&self.sql_dirs))?;
        }
        if !self.migrations_dirs.is_empty() {
            config.add_migration_dirs(&dir_list(&self.migrations_dirs))?;
        }
        Ok(config)
    }
}

fn dir_list(dirs: &[PathBuf]) -> DirSpec {
    DirSpec::List(dirs.iter().cloned().map(DirSpec::Path).collect())
}

/// Runs a parsed command line and returns the process exit code.
///
/// # Errors
///
/// Fails on configuration errors and on database errors outside a single
/// migration step.
pub async fn run(cli: Cli, registry: &MigrationRegistry, out: &mut dyn Write) -> anyhow::Result<u8> {
    let config = cli.connection_config()?;

    match cli.command {
        Commands::CreateMigrationsTable => {
            let mut env = Environment::new(config).with_stacktrace(cli.stacktrace);
            Ok(commands::create_migrations_table(&mut env, out).await?)
        }
        Commands::Migrations { apply } => {
            let mut env = Environment::new(config).with_stacktrace(cli.stacktrace);
            Ok(commands::migrate(&mut env, registry, apply, out).await?)
        }
        Commands::AddMigration { file, namespace } => {
            let name = match file {
                Some(name) => name,
                None => prompt(out, "Name of the migration script: ")?,
            };
            let now = chrono::Local::now().naive_local();
            match commands::add_migration(&config, &namespace, &name, now) {
                Ok(path) => {
                    writeln!(out, "Migration created:\n{}", path.display())?;
                    Ok(0)
                }
                Err(err) => {
                    writeln!(out, "{}: {err}\nAborting.", "Error".red().bold())?;
                    Ok(1)
                }
            }
        }
    }
}

fn prompt(out: &mut dyn Write, question: &str) -> anyhow::Result<String> {
    write!(out, "{question}")?;
    out.flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read the migration name")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_migrations() {
        let cli = Cli::parse_from([
            "oxide-migrate",
            "--database",
            "sqlite::memory:",
            "migrations",
            "--apply",
            "--stacktrace",
        ]);
        assert!(cli.stacktrace);
        assert!(matches!(cli.command, Commands::Migrations { apply: true }));
        assert_eq!(cli.conn, "default");
    }

    #[test]
    fn test_parse_add_migration() {
        let cli = Cli::parse_from([
            "oxide-migrate",
            "add-migration",
            "-f",
            "seed.rs",
            "--namespace",
            "billing",
        ]);
        match cli.command {
            Commands::AddMigration { file, namespace } => {
                assert_eq!(file.as_deref(), Some("seed.rs"));
                assert_eq!(namespace, "billing");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_connection_from_flags() {
        let root = TempDir::new().unwrap();
        let dir = root.path().to_str().unwrap();
        let cli = Cli::parse_from([
            "oxide-migrate",
            "-d",
            "sqlite::memory:",
            "-m",
            dir,
            "--sql-dir",
            dir,
            "create-migrations-table",
        ]);
        let config = cli.connection_config().unwrap();
        assert_eq!(config.migration_dirs().len(), 1);
        assert_eq!(config.sql_dirs().len(), 1);
    }

    #[test]
    fn test_connection_from_settings_file() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("migrations")).unwrap();
        let path = root.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            "[connections.reports]\naddress = \"sqlite::memory:\"\nmigrations = \"migrations\"\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "oxide-migrate",
            "--config",
            path.to_str().unwrap(),
            "--conn",
            "reports",
            "migrations",
        ]);
        let config = cli.connection_config().unwrap();
        assert_eq!(
            config.migration_dirs(),
            [std::fs::canonicalize(root.path().join("migrations")).unwrap()]
        );
    }
}
