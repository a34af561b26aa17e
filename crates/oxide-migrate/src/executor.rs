//! Migration executor.
//!
//! Applies every pending migration in one batch. On SQLite and PostgreSQL
//! the batch runs in a single transaction that is committed only with
//! `apply`; a failure rolls everything back. MySQL commits DDL implicitly,
//! so there each migration is durable as soon as it ran and a failure
//! leaves the earlier ones in place.

use std::io::Write;

use colored::Colorize;
use oxide_query::template;
use tracing::{debug, error, info, warn};

use crate::environment::Environment;
use crate::error::{MigrateError, Result};
use crate::migration::{self, MigrationFile, MigrationKind};
use crate::registry::MigrationRegistry;

/// Status of the batch after the most recent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    /// No migration has run yet.
    Started,
    /// The last migration was applied.
    Success,
    /// The last migration was empty and skipped.
    Warning,
    /// A migration failed; the batch stopped there.
    Error,
}

/// A migration that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFailure {
    /// File name of the migration.
    pub migration: String,
    /// Error message.
    pub message: String,
}

/// Outcome of a migration batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Migrations that ran successfully, in order.
    pub applied: Vec<String>,
    /// Empty migrations that were skipped.
    pub skipped: Vec<String>,
    /// The migration that stopped the batch.
    pub failure: Option<MigrationFailure>,
    /// Status after the last step.
    pub status: MigrationStatus,
    /// Whether the batch ran in a transaction.
    pub transactional: bool,
    /// Whether the changes were made durable.
    pub committed: bool,
}

impl MigrationReport {
    fn new(transactional: bool) -> Self {
        Self {
            applied: Vec::new(),
            skipped: Vec::new(),
            failure: None,
            status: MigrationStatus::Started,
            transactional,
            committed: false,
        }
    }

    /// Number of migrations that ran successfully.
    #[must_use]
    pub fn num_applied(&self) -> usize {
        self.applied.len()
    }

    /// Whether a migration failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Process exit code for the batch.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.failed())
    }

    fn count(&self) -> String {
        let n = self.num_applied();
        let plural = if n > 1 { "s" } else { "" };
        format!("{n} migration{plural}")
    }
}

/// Runs pending migrations against an [`Environment`].
#[derive(Debug)]
pub struct Migrator<'r> {
    registry: &'r MigrationRegistry,
    apply: bool,
    transactional: Option<bool>,
}

impl<'r> Migrator<'r> {
    /// Creates a migrator that resolves `.rs` migrations in `registry`.
    ///
    /// Without [`Self::apply`] the batch is a test run on transactional
    /// drivers.
    #[must_use]
    pub fn new(registry: &'r MigrationRegistry) -> Self {
        Self {
            registry,
            apply: false,
            transactional: None,
        }
    }

    /// Commits the batch instead of rolling it back.
    #[must_use]
    pub fn apply(mut self, apply: bool) -> Self {
        self.apply = apply;
        self
    }

    /// Overrides whether the batch runs in one transaction. Defaults to
    /// what the driver supports.
    #[must_use]
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = Some(transactional);
        self
    }

    /// Applies every pending migration, writing progress lines to `out`.
    ///
    /// Failures of individual migrations end up in the report; only
    /// failures around the batch itself (transaction control, reading the
    /// tracking table, writing to `out`) are returned as errors.
    pub async fn run(&self, env: &mut Environment, out: &mut dyn Write) -> Result<MigrationReport> {
        let files = migration::discover_all(env.config())?;
        let transactional = self
            .transactional
            .unwrap_or_else(|| env.supports_transactions());
        let mut report = MigrationReport::new(transactional);

        if report.transactional {
            env.db().begin().await?;
        }
        match self.run_batch(env, &files, &mut report, out).await {
            Ok(()) => Ok(report),
            Err(err) => {
                if report.transactional && !report.committed {
                    if let Err(rollback) = env.db().rollback().await {
                        warn!(error = %rollback, "Rollback after failed batch");
                    }
                }
                Err(err)
            }
        }
    }

    async fn run_batch(
        &self,
        env: &mut Environment,
        files: &[MigrationFile],
        report: &mut MigrationReport,
        out: &mut dyn Write,
    ) -> Result<()> {
        let applied = env.applied_migrations().await?;
        let driver = env.driver();

        for file in files {
            if applied.contains(&file.name) {
                continue;
            }
            if !file.supports(driver) {
                debug!(migration = %file.name, %driver, "Skipping migration for other driver");
                continue;
            }

            match self.step(env, file).await {
                Ok(Step::Applied) => {
                    info!(migration = %file.name, namespace = %file.namespace, "Migration applied");
                    writeln!(
                        out,
                        "{}: Migration '{}' successfully applied",
                        "Success".green().bold(),
                        file.name.yellow().bold()
                    )?;
                    report.applied.push(file.name.clone());
                    report.status = MigrationStatus::Success;
                }
                Ok(Step::Empty) => {
                    warn!(migration = %file.name, "Migration is empty, skipped");
                    writeln!(
                        out,
                        "{}: Migration '{}' is empty. Skipped",
                        "Warning".yellow(),
                        file.name.yellow().bold()
                    )?;
                    report.skipped.push(file.name.clone());
                    report.status = MigrationStatus::Warning;
                }
                Err(err) => {
                    error!(migration = %file.name, error = %err, "Migration failed");
                    writeln!(
                        out,
                        "{}: while working on migration '{}'",
                        "Error".red().bold(),
                        file.name.yellow().bold()
                    )?;
                    writeln!(out, "{err}")?;
                    if env.show_stacktrace() {
                        write_chain(out, &err)?;
                    }
                    report.failure = Some(MigrationFailure {
                        migration: file.name.clone(),
                        message: err.to_string(),
                    });
                    report.status = MigrationStatus::Error;
                    break;
                }
            }
        }

        self.finish(env, report, out).await
    }

    async fn step(&self, env: &mut Environment, file: &MigrationFile) -> Result<Step> {
        let source = std::fs::read_to_string(&file.path)?;
        if source.trim().is_empty() {
            return Ok(Step::Empty);
        }

        match file.kind {
            MigrationKind::Sql => {
                run_sql(env, file, source).await?;
            }
            MigrationKind::Template => {
                let mut context = template::context(env.driver());
                context.insert("config", env.config());
                let sql = template::render(&source, &context)?;
                if sql.trim().is_empty() {
                    return Ok(Step::Empty);
                }
                run_sql(env, file, sql).await?;
            }
            MigrationKind::Code => {
                let migration = self
                    .registry
                    .get(file.stem())
                    .ok_or_else(|| MigrateError::UnregisteredMigration(file.name.clone()))?;
                migration.run(env).await?;
                env.record_migration(&file.name).await?;
            }
        }
        Ok(Step::Applied)
    }

    async fn finish(
        &self,
        env: &mut Environment,
        report: &mut MigrationReport,
        out: &mut dyn Write,
    ) -> Result<()> {
        let count = report.count();

        if !report.transactional {
            report.committed = report.num_applied() > 0;
            if report.failed() {
                writeln!(out, "\n{count} applied until the error occured")?;
            } else if report.num_applied() > 0 {
                writeln!(out, "\n{count} successfully applied")?;
            } else {
                writeln!(out, "\nNo migrations applied")?;
            }
            return Ok(());
        }

        if self.apply && !report.failed() && report.num_applied() > 0 {
            env.db().commit().await?;
            report.committed = true;
            writeln!(out, "\n{count} successfully applied")?;
            return Ok(());
        }

        if report.failed() {
            writeln!(out, "\nDue to errors no migrations applied")?;
        } else if report.num_applied() == 0 {
            writeln!(out, "\nNo migrations applied")?;
        } else {
            writeln!(out, "\n{}: Test run only", "Notice".red().bold())?;
            writeln!(
                out,
                "Would apply {count}. Use the switch --apply to make it happen"
            )?;
        }
        env.db().rollback().await?;
        Ok(())
    }
}

enum Step {
    Applied,
    Empty,
}

async fn run_sql(env: &mut Environment, file: &MigrationFile, sql: String) -> Result<()> {
    debug!(migration = %file.name, "Executing migration SQL");
    env.db().execute(sql, ()).run().await?;
    env.record_migration(&file.name).await
}

/// Writes the causes of `err`, one per line.
pub(crate) fn write_chain(out: &mut dyn Write, err: &dyn std::error::Error) -> std::io::Result<()> {
    let mut source = err.source();
    while let Some(cause) = source {
        writeln!(out, "  caused by: {cause}")?;
        source = cause.source();
    }
    Ok(())
}
