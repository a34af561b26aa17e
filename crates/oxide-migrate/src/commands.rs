//! The migration commands: create the tracking table, run migrations and
//! add a new migration file.
//!
//! Commands write operator-facing lines to a caller-supplied sink and
//! return the process exit code.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDateTime;
use colored::Colorize;
use oxide_query::path::normalize;
use oxide_query::ConnectionConfig;
use tracing::info;

use crate::environment::Environment;
use crate::error::{MigrateError, Result};
use crate::executor::{write_chain, Migrator};
use crate::migration::MigrationKind;
use crate::registry::MigrationRegistry;

/// Format of the timestamp prefix of new migration files.
pub const TIMESTAMP_FORMAT: &str = "%y%m%d-%H%M%S";

/// Creates the migrations tracking table.
///
/// Exit code 0 when the table was created, 1 if it already exists, the
/// driver has no DDL, or creation failed.
pub async fn create_migrations_table(env: &mut Environment, out: &mut dyn Write) -> Result<u8> {
    let table = env.table().qualified_name();

    if env.migrations_table_exists().await? {
        writeln!(out, "Table '{table}' already exists. Aborting")?;
        return Ok(1);
    }

    if env.migrations_table_ddl().is_none() {
        writeln!(out, "Driver '{}' not supported. Aborting", env.driver())?;
        return Ok(1);
    }

    match env.create_migrations_table().await {
        Ok(_) => {
            info!(%table, "Created migrations table");
            writeln!(out, "{}: Created table '{table}'", "Success".green().bold())?;
            Ok(0)
        }
        Err(err) => {
            writeln!(
                out,
                "{}: While trying to create table '{table}'",
                "Error".red().bold()
            )?;
            writeln!(out, "{err}")?;
            if env.show_stacktrace() {
                write_chain(out, &err)?;
            }
            Ok(1)
        }
    }
}

/// Applies missing migrations.
///
/// Without `apply` the batch is rolled back at the end on drivers with
/// transactional DDL. Exit code 1 if no migration directory is configured,
/// the tracking table is missing, or a migration failed.
pub async fn migrate(
    env: &mut Environment,
    registry: &MigrationRegistry,
    apply: bool,
    out: &mut dyn Write,
) -> Result<u8> {
    if env
        .config()
        .namespaced_migration_dirs()
        .values()
        .all(Vec::is_empty)
    {
        writeln!(
            out,
            "{}: No migration directories defined in configuration",
            "Notice".red().bold()
        )?;
        return Ok(1);
    }

    if !env.migrations_table_exists().await? {
        write_missing_table_help(env, out)?;
        return Ok(1);
    }

    let report = Migrator::new(registry).apply(apply).run(env, out).await?;
    Ok(report.exit_code())
}

fn write_missing_table_help(env: &Environment, out: &mut dyn Write) -> Result<()> {
    let driver = env.driver();
    let Some(ddl) = env.migrations_table_ddl() else {
        writeln!(out, "Driver '{driver}' is not supported.")?;
        return Ok(());
    };

    writeln!(
        out,
        "Migrations table does not exist. For '{driver}' it should look like:\n"
    )?;
    writeln!(out, "{ddl}\n")?;
    writeln!(out, "If you want to create the table above, simply run\n")?;
    writeln!(out, "    oxide-migrate create-migrations-table\n")?;
    writeln!(
        out,
        "If you need to change the table or column names set them in the connection settings:\n"
    )?;
    writeln!(out, "    migrations_table = \"...\"")?;
    writeln!(out, "    migrations_column_migration = \"...\"")?;
    writeln!(out, "    migrations_column_applied = \"...\"")?;
    Ok(())
}

/// Normalizes a requested migration name: spaces and underscores become
/// dashes, letters are lowercased, and a missing extension becomes `.sql`.
///
/// # Errors
///
/// Returns [`MigrateError::UnsupportedExtension`] for other extensions.
pub fn migration_file_name(name: &str) -> Result<(String, MigrationKind)> {
    let name = name.trim().replace([' ', '_'], "-").to_lowercase();
    match Path::new(&name).extension().and_then(|e| e.to_str()) {
        None => Ok((format!("{name}.sql"), MigrationKind::Sql)),
        Some(extension) => MigrationKind::from_extension(extension)
            .map(|kind| (name.clone(), kind))
            .ok_or_else(|| MigrateError::UnsupportedExtension(extension.to_string())),
    }
}

/// Creates a new migration file in the highest-precedence directory of
/// `namespace` and returns its path.
///
/// # Errors
///
/// Fails for unsupported extensions, a namespace without directories, and
/// directories that are missing, vendored or read-only.
pub fn add_migration(
    config: &ConnectionConfig,
    namespace: &str,
    name: &str,
    now: NaiveDateTime,
) -> Result<PathBuf> {
    let (file_name, kind) = migration_file_name(name)?;

    if config.namespaced_migration_dirs().values().all(Vec::is_empty) {
        return Err(MigrateError::NoMigrationDirs);
    }
    let dir = config
        .namespaced_migration_dirs()
        .get(namespace)
        .and_then(|dirs| dirs.first())
        .ok_or_else(|| MigrateError::NamespaceNotFound(namespace.to_string()))?;

    if is_vendored(dir) {
        return Err(MigrateError::VendoredDirectory(dir.clone()));
    }
    if !dir.is_dir() {
        return Err(MigrateError::MigrationsDirNotFound(dir.clone()));
    }
    if std::fs::metadata(dir)?.permissions().readonly() {
        return Err(MigrateError::NotWritable(dir.clone()));
    }

    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let path = dir.join(format!("{timestamp}-{file_name}"));
    if path.exists() {
        return Err(MigrateError::MigrationExists(path));
    }

    let content = match kind {
        MigrationKind::Sql => String::new(),
        MigrationKind::Template => TEMPLATE_STUB.to_string(),
        MigrationKind::Code => code_stub(&file_name, &timestamp),
    };
    std::fs::write(&path, content)?;
    info!(path = %path.display(), "Created migration");
    Ok(path)
}

/// Whether `dir` lies in a vendored tree or the cargo registry.
fn is_vendored(dir: &Path) -> bool {
    let dir = normalize(dir);
    let parts: Vec<Component<'_>> = dir.components().collect();
    parts.iter().any(|c| c.as_os_str() == "vendor")
        || parts
            .windows(2)
            .any(|w| w[0].as_os_str() == ".cargo" && w[1].as_os_str() == "registry")
        || std::env::var_os("CARGO_HOME")
            .is_some_and(|home| oxide_query::path::is_inside(Path::new(&home).join("registry"), &dir))
}

const TEMPLATE_STUB: &str = r#"{% if driver == "pgsql" %}

{% else %}

{% endif %}
"#;

/// Rust skeleton for a code migration. `what-is-up.rs` becomes `WhatIsUp`,
/// `2fa-setup.rs` becomes `Migration2faSetup`.
fn code_stub(file_name: &str, timestamp: &str) -> String {
    let stem = file_name.trim_end_matches(".rs");
    let mut type_name: String = stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect();
    if !type_name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        type_name.insert_str(0, "Migration");
    }

    format!(
        r#"use oxide_migrate::prelude::*;

pub struct {type_name};

#[async_trait(?Send)]
impl CodeMigration for {type_name} {{
    async fn run(&self, env: &mut Environment) -> anyhow::Result<()> {{
        env.db().execute("", ()).run().await?;
        let rows = env.db().execute("", ()).all(Some(FetchMode::Assoc)).await?;

        Ok(())
    }}
}}

// Register in the migration binary:
//     registry.register("{timestamp}-{stem}", {type_name});
"#
    )
}
