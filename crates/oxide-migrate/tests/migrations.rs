//! Migration runs against an in-memory SQLite database with migration
//! files written to temporary directories.

use std::path::Path;

use oxide_migrate::commands;
use oxide_migrate::prelude::*;
use oxide_query::DirSpec;
use tempfile::TempDir;

struct InsertAdmin;

#[async_trait(?Send)]
impl CodeMigration for InsertAdmin {
    async fn run(&self, env: &mut Environment) -> anyhow::Result<()> {
        env.db()
            .execute(
                "INSERT INTO users (name) VALUES (:name)",
                Args::named([("name", "admin")]),
            )
            .run()
            .await?;
        Ok(())
    }
}

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), body).unwrap();
}

fn environment(dirs: &[(&str, &Path)]) -> Environment {
    colored::control::set_override(false);
    let mut config = ConnectionConfig::new("sqlite::memory:").unwrap();
    for (namespace, dir) in dirs {
        config
            .add_namespaced_migration_dirs(namespace, &DirSpec::from(*dir))
            .unwrap();
    }
    Environment::new(config)
}

async fn prepared(dirs: &[(&str, &Path)]) -> Environment {
    let mut env = environment(dirs);
    let mut out = Vec::new();
    assert_eq!(commands::create_migrations_table(&mut env, &mut out).await.unwrap(), 0);
    env
}

async fn migrate(env: &mut Environment, registry: &MigrationRegistry, apply: bool) -> (u8, String) {
    let mut out = Vec::new();
    let code = commands::migrate(env, registry, apply, &mut out).await.unwrap();
    (code, String::from_utf8(out).unwrap())
}

async fn count(env: &mut Environment, sql: &str) -> i64 {
    let row = env
        .db()
        .execute(sql, ())
        .one(Some(FetchMode::Num))
        .await
        .unwrap()
        .unwrap();
    row[0].as_i64().unwrap()
}

async fn applied(env: &mut Environment) -> Vec<String> {
    let rows = env
        .db()
        .execute("SELECT migration FROM migrations ORDER BY migration", ())
        .all(Some(FetchMode::Assoc))
        .await
        .unwrap();
    rows.iter()
        .map(|r| r["migration"].as_str().unwrap().to_string())
        .collect()
}

fn fixtures(root: &TempDir) {
    let dir = root.path();
    write(
        dir,
        "000-a.sql",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE notes (body TEXT NOT NULL);",
    );
    write(dir, "000-b.rs", "// InsertAdmin");
    write(
        dir,
        "000-c.tpql",
        "INSERT INTO notes (body) VALUES ('{{ driver }}:{{ config.migrations_table }}');
{% if driver == \"pgsql\" %}CREATE INDEX notes_body ON notes USING hash (body);{% endif %}",
    );
    write(dir, "000-d-[mysql].sql", "ALTER TABLE users ENGINE = InnoDB;");
    write(dir, "README.md", "not a migration");
}

#[tokio::test]
async fn test_missing_table_prints_ddl() {
    let root = TempDir::new().unwrap();
    let mut env = environment(&[("default", root.path())]);

    let (code, out) = migrate(&mut env, &MigrationRegistry::new(), true).await;
    assert_eq!(code, 1);
    assert!(out.contains("Migrations table does not exist. For 'sqlite' it should look like:"));
    assert!(out.contains("CREATE TABLE migrations ("));
    assert!(out.contains("oxide-migrate create-migrations-table"));
}

#[tokio::test]
async fn test_create_migrations_table_twice() {
    let mut env = environment(&[]);
    let mut out = Vec::new();
    assert_eq!(commands::create_migrations_table(&mut env, &mut out).await.unwrap(), 0);
    assert_eq!(commands::create_migrations_table(&mut env, &mut out).await.unwrap(), 1);

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Success: Created table 'migrations'"));
    assert!(out.contains("Table 'migrations' already exists. Aborting"));
}

#[tokio::test]
async fn test_apply_in_order_and_skip_other_drivers() {
    let root = TempDir::new().unwrap();
    fixtures(&root);
    let registry = MigrationRegistry::new().with("000-b", InsertAdmin);
    let mut env = prepared(&[("default", root.path())]).await;

    let (code, out) = migrate(&mut env, &registry, true).await;
    assert_eq!(code, 0, "{out}");
    assert!(out.contains("Success: Migration '000-a.sql' successfully applied"));
    assert!(out.contains("Success: Migration '000-b.rs' successfully applied"));
    assert!(out.contains("Success: Migration '000-c.tpql' successfully applied"));
    assert!(!out.contains("000-d"));
    assert!(out.contains("3 migrations successfully applied"));

    let a = out.find("000-a.sql").unwrap();
    let b = out.find("000-b.rs").unwrap();
    let c = out.find("000-c.tpql").unwrap();
    assert!(a < b && b < c);

    assert_eq!(applied(&mut env).await, vec!["000-a.sql", "000-b.rs", "000-c.tpql"]);
    assert_eq!(count(&mut env, "SELECT count(*) FROM users").await, 1);
    let note = env
        .db()
        .execute("SELECT body FROM notes", ())
        .one(Some(FetchMode::Assoc))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(note["body"], "sqlite:migrations");
}

#[tokio::test]
async fn test_second_run_applies_nothing() {
    let root = TempDir::new().unwrap();
    fixtures(&root);
    let registry = MigrationRegistry::new().with("000-b", InsertAdmin);
    let mut env = prepared(&[("default", root.path())]).await;

    assert_eq!(migrate(&mut env, &registry, true).await.0, 0);
    let (code, out) = migrate(&mut env, &registry, true).await;
    assert_eq!(code, 0);
    assert!(out.contains("No migrations applied"));
    assert_eq!(count(&mut env, "SELECT count(*) FROM users").await, 1);
}

#[tokio::test]
async fn test_dry_run_rolls_back() {
    let root = TempDir::new().unwrap();
    write(root.path(), "001-users.sql", "CREATE TABLE users (id INTEGER);");
    let mut env = prepared(&[("default", root.path())]).await;

    let (code, out) = migrate(&mut env, &MigrationRegistry::new(), false).await;
    assert_eq!(code, 0);
    assert!(out.contains("Notice: Test run only"));
    assert!(out.contains("Would apply 1 migration. Use the switch --apply to make it happen"));

    assert!(applied(&mut env).await.is_empty());
    assert_eq!(
        count(
            &mut env,
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'users'"
        )
        .await,
        0
    );
}

#[tokio::test]
async fn test_failure_rolls_back_batch() {
    let root = TempDir::new().unwrap();
    write(root.path(), "001-users.sql", "CREATE TABLE users (id INTEGER);");
    write(root.path(), "002-broken.sql", "CREATE TABLE users (id INTEGER);");
    write(root.path(), "003-never.sql", "CREATE TABLE never (id INTEGER);");
    let mut env = prepared(&[("default", root.path())]).await;

    let (code, out) = migrate(&mut env, &MigrationRegistry::new(), true).await;
    assert_eq!(code, 1);
    assert!(out.contains("Error: while working on migration '002-broken.sql'"));
    assert!(out.contains("Due to errors no migrations applied"));
    assert!(!out.contains("003-never.sql"));
    assert!(applied(&mut env).await.is_empty());
}

#[tokio::test]
async fn test_empty_migration_is_skipped() {
    let root = TempDir::new().unwrap();
    write(root.path(), "001-empty.sql", "  \n\t\n");
    write(
        root.path(),
        "002-pg-only.tpql",
        "{% if driver == \"pgsql\" %}CREATE EXTENSION citext;{% endif %}",
    );
    let mut env = prepared(&[("default", root.path())]).await;

    let (code, out) = migrate(&mut env, &MigrationRegistry::new(), true).await;
    assert_eq!(code, 0);
    assert!(out.contains("Warning: Migration '001-empty.sql' is empty. Skipped"));
    assert!(out.contains("Warning: Migration '002-pg-only.tpql' is empty. Skipped"));
    assert!(out.contains("No migrations applied"));
    assert!(applied(&mut env).await.is_empty());
}

#[tokio::test]
async fn test_unregistered_code_migration_fails() {
    let root = TempDir::new().unwrap();
    write(root.path(), "001-seed.rs", "// Seed");
    let mut env = prepared(&[("default", root.path())]).await;

    let (code, out) = migrate(&mut env, &MigrationRegistry::new(), true).await;
    assert_eq!(code, 1);
    assert!(out.contains("while working on migration '001-seed.rs'"));
    assert!(out.contains("No code migration registered for '001-seed.rs'"));
}

#[tokio::test]
async fn test_namespaces_apply_in_name_order() {
    let root = TempDir::new().unwrap();
    let billing = root.path().join("billing");
    let core = root.path().join("core");
    write(&core, "100-users.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY);");
    write(
        &billing,
        "001-invoices.sql",
        "CREATE TABLE invoices (id INTEGER PRIMARY KEY);",
    );
    let mut env = prepared(&[("core", core.as_path()), ("billing", billing.as_path())]).await;

    let (code, out) = migrate(&mut env, &MigrationRegistry::new(), true).await;
    assert_eq!(code, 0, "{out}");
    assert!(out.find("001-invoices.sql").unwrap() < out.find("100-users.sql").unwrap());
    assert!(out.contains("2 migrations successfully applied"));
}

#[tokio::test]
async fn test_no_migration_dirs() {
    let mut env = environment(&[]);
    let (code, out) = migrate(&mut env, &MigrationRegistry::new(), true).await;
    assert_eq!(code, 1);
    assert!(out.contains("Notice: No migration directories defined in configuration"));
}

#[tokio::test]
async fn test_migrator_report() {
    let root = TempDir::new().unwrap();
    write(root.path(), "001-users.sql", "CREATE TABLE users (id INTEGER);");
    write(root.path(), "002-empty.sql", "");
    let registry = MigrationRegistry::new();
    let mut env = prepared(&[("default", root.path())]).await;

    let report = Migrator::new(&registry)
        .apply(true)
        .run(&mut env, &mut std::io::sink())
        .await
        .unwrap();
    assert_eq!(report.applied, vec!["001-users.sql"]);
    assert_eq!(report.skipped, vec!["002-empty.sql"]);
    assert_eq!(report.status, MigrationStatus::Warning);
    assert!(report.transactional);
    assert!(report.committed);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_non_transactional_failure_keeps_earlier_migrations() {
    let root = TempDir::new().unwrap();
    write(root.path(), "001-users.sql", "CREATE TABLE users (id INTEGER);");
    write(root.path(), "002-notes.sql", "CREATE TABLE notes (id INTEGER);");
    write(root.path(), "003-broken.sql", "CREATE TABLE users (id INTEGER);");
    let registry = MigrationRegistry::new();
    let mut env = prepared(&[("default", root.path())]).await;

    let mut out = Vec::new();
    let report = Migrator::new(&registry)
        .apply(true)
        .transactional(false)
        .run(&mut env, &mut out)
        .await
        .unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(!report.transactional);
    assert!(report.committed);
    assert_eq!(report.applied, vec!["001-users.sql", "002-notes.sql"]);
    assert_eq!(report.failure.as_ref().unwrap().migration, "003-broken.sql");
    assert_eq!(report.exit_code(), 1);
    assert!(out.contains("2 migrations applied until the error occured"));
    assert_eq!(applied(&mut env).await, vec!["001-users.sql", "002-notes.sql"]);
}

#[tokio::test]
async fn test_non_transactional_run_applies_without_flag() {
    let root = TempDir::new().unwrap();
    write(root.path(), "001-users.sql", "CREATE TABLE users (id INTEGER);");
    let registry = MigrationRegistry::new();
    let mut env = prepared(&[("default", root.path())]).await;

    let mut out = Vec::new();
    let report = Migrator::new(&registry)
        .transactional(false)
        .run(&mut env, &mut out)
        .await
        .unwrap();
    assert!(report.committed);
    assert!(String::from_utf8(out)
        .unwrap()
        .contains("1 migration successfully applied"));
    assert_eq!(applied(&mut env).await, vec!["001-users.sql"]);
}

struct ClosedOutput;

impl std::io::Write for ClosedOutput {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_output_failure_rolls_back_batch() {
    let root = TempDir::new().unwrap();
    write(root.path(), "001-users.sql", "CREATE TABLE users (id INTEGER);");
    let registry = MigrationRegistry::new();
    let mut env = prepared(&[("default", root.path())]).await;

    let err = Migrator::new(&registry)
        .apply(true)
        .run(&mut env, &mut ClosedOutput)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Io(_)));

    // No transaction is left open.
    env.db().begin().await.unwrap();
    env.db().rollback().await.unwrap();
    assert!(applied(&mut env).await.is_empty());
    assert_eq!(
        count(
            &mut env,
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'users'"
        )
        .await,
        0
    );
}
