//! End-to-end tests against an in-memory SQLite database with scripts
//! written to temporary directories.

use oxide_query::prelude::*;
use oxide_query::ErrorCategory;
use serde_json::json;
use tempfile::TempDir;

const SCHEMA: &str = "
    CREATE TABLE members (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        joined INTEGER NOT NULL,
        note TEXT
    );
    INSERT INTO members (id, name, joined, note) VALUES
        (1, 'Chuck Schuldiner', 1983, NULL),
        (2, 'Rick Rozz', 1984, 'guitar'),
        (3, 'Bill Andrews', 1987, 'drums'),
        (4, 'Steve DiGiorgio', 1991, 'bass'),
        (5, 'Gene Hoglan', 1993, 'drums');
";

fn write(root: &TempDir, rel: &str, body: &str) {
    let path = root.path().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

fn fixtures() -> TempDir {
    let root = TempDir::new().unwrap();
    write(
        &root,
        "members/by_year_named.sql",
        "SELECT name FROM members WHERE joined >= :from AND joined <= :to ORDER BY id",
    );
    write(
        &root,
        "members/by_year.sql",
        "SELECT name FROM members WHERE joined >= ? AND joined <= ? ORDER BY id",
    );
    write(
        &root,
        "members/filter.tpql",
        "SELECT name FROM members WHERE 1 = 1
{% if instrument %} AND note = :instrument{% endif %}
{% if driver == \"sqlite\" %} /* sqlite */{% endif %}
ORDER BY id",
    );
    write(&root, "members/all.sql", "SELECT id, name FROM members ORDER BY id");
    root
}

async fn database(root: &TempDir) -> Database {
    let mut config = ConnectionConfig::new("sqlite::memory:").unwrap();
    config.add_sql_dirs(&DirSpec::from(root.path())).unwrap();
    let mut db = Database::new(config);
    db.execute(SCHEMA, ()).run().await.unwrap();
    db
}

fn names(rows: &[serde_json::Value]) -> Vec<&str> {
    rows.iter().map(|r| r["name"].as_str().unwrap()).collect()
}

#[tokio::test]
async fn test_argument_forms_return_same_rows() {
    let root = fixtures();
    let mut db = database(&root).await;
    let positional = db.script("members", "by_year").unwrap();
    let named = db.script("members", "by_year_named").unwrap();

    let forms = [
        (&positional, Args::positional([1984, 1991])),
        (
            &positional,
            Args::from_variadic(vec![json!(1984), json!(1991)]).unwrap(),
        ),
        (&positional, Args::from_json(json!([1984, 1991])).unwrap()),
        (&named, Args::named([("from", 1984), ("to", 1991)])),
        (
            &named,
            Args::from_json(json!({"to": 1991, "from": 1984})).unwrap(),
        ),
    ];

    for (script, args) in forms {
        let rows = script
            .invoke(&mut db, args)
            .unwrap()
            .all(Some(FetchMode::Assoc))
            .await
            .unwrap();
        assert_eq!(
            names(&rows),
            vec!["Rick Rozz", "Bill Andrews", "Steve DiGiorgio"]
        );
    }
}

#[tokio::test]
async fn test_fetch_modes() {
    let root = fixtures();
    let mut db = database(&root).await;
    let script = db.script("members", "all").unwrap();

    let mut query = script.invoke(&mut db, ()).unwrap();
    let assoc = query.one(Some(FetchMode::Assoc)).await.unwrap().unwrap();
    assert_eq!(assoc, json!({"id": 1, "name": "Chuck Schuldiner"}));

    let mut query = script.invoke(&mut db, ()).unwrap();
    let num = query.one(Some(FetchMode::Num)).await.unwrap().unwrap();
    assert_eq!(num, json!([1, "Chuck Schuldiner"]));

    let mut query = script.invoke(&mut db, ()).unwrap();
    let both = query.one(None).await.unwrap().unwrap();
    assert_eq!(
        both,
        json!({"0": 1, "id": 1, "1": "Chuck Schuldiner", "name": "Chuck Schuldiner"})
    );
}

#[tokio::test]
async fn test_one_walks_the_result_set() {
    let root = fixtures();
    let mut db = database(&root).await;
    let mut query = db.execute(
        "SELECT id FROM members WHERE joined > ? ORDER BY id",
        Args::positional([1990]),
    );

    let first = query.one(Some(FetchMode::Num)).await.unwrap();
    let second = query.one(Some(FetchMode::Num)).await.unwrap();
    let third = query.one(Some(FetchMode::Num)).await.unwrap();
    assert_eq!(first, Some(json!([4])));
    assert_eq!(second, Some(json!([5])));
    assert_eq!(third, None);
}

#[tokio::test]
async fn test_null_values() {
    let root = fixtures();
    let mut db = database(&root).await;
    let row = db
        .execute("SELECT note FROM members WHERE id = :id", Args::named([("id", 1)]))
        .one(Some(FetchMode::Assoc))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row, json!({"note": null}));
}

#[tokio::test]
async fn test_run_and_len() {
    let root = fixtures();
    let mut db = database(&root).await;

    let changed = db
        .execute(
            "UPDATE members SET note = :note WHERE joined < :year",
            Args::named([("note", Value::from("founding")), ("year", Value::Int(1985))]),
        )
        .len()
        .await
        .unwrap();
    assert_eq!(changed, 2);

    assert!(db
        .execute("DELETE FROM members WHERE id = ?", Args::positional([5]))
        .run()
        .await
        .unwrap());

    let count = db
        .execute("SELECT COUNT(*) AS n FROM members", ())
        .one(Some(FetchMode::Assoc))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count["n"], json!(4));
}

#[tokio::test]
async fn test_template_prunes_unreferenced_arguments() {
    let root = fixtures();
    let mut db = database(&root).await;
    let script = db.script("members", "filter").unwrap();
    assert!(script.is_template());

    let rows = script
        .invoke(
            &mut db,
            Args::named([("instrument", Value::from("drums")), ("unused", Value::Int(1))]),
        )
        .unwrap()
        .all(Some(FetchMode::Assoc))
        .await
        .unwrap();
    assert_eq!(names(&rows), vec!["Bill Andrews", "Gene Hoglan"]);

    let query = script
        .invoke(&mut db, Args::named([("instrument", Value::Null)]))
        .unwrap();
    assert!(query.args().is_empty());
    assert!(query.sql().contains("/* sqlite */"));
}

#[tokio::test]
async fn test_template_rejects_positional_arguments() {
    let root = fixtures();
    let mut db = database(&root).await;
    let script = db.script("members", "filter").unwrap();
    let err = script
        .invoke(&mut db, Args::positional(["drums"]))
        .unwrap_err();
    assert!(matches!(err, Error::TemplateRequiresNamedArguments));
    assert_eq!(err.category(), ErrorCategory::Template);
}

#[tokio::test]
async fn test_interpolation_leaves_literals_alone() {
    let root = fixtures();
    let mut db = database(&root).await;
    let query = db.execute(
        "SELECT '-- :name' AS a, /* :name */ :name AS b -- :name",
        Args::named([("name", "Death")]),
    );
    assert_eq!(
        query.to_string(),
        "SELECT '-- :name' AS a, /* :name */ 'Death' AS b -- :name"
    );
}

#[tokio::test]
async fn test_named_placeholder_in_literal_is_not_bound() {
    let root = fixtures();
    let mut db = database(&root).await;
    let row = db
        .execute(
            "SELECT ':id' AS literal, id FROM members WHERE id = :id",
            Args::named([("id", 2)]),
        )
        .one(Some(FetchMode::Assoc))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row, json!({"literal": ":id", "id": 2}));
}

#[tokio::test]
async fn test_binding_errors_surface() {
    let root = fixtures();
    let mut db = database(&root).await;

    let err = db
        .execute("SELECT :a", Args::named([("a", 1), ("b", 2)]))
        .all(None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnusedArgument(ref b) if b == "b"));
    assert_eq!(err.category(), ErrorCategory::Binding);

    let err = db
        .execute("SELECT * FROM nowhere", ())
        .all(None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Execution);
}

#[tokio::test]
async fn test_placeholders_need_arguments() {
    let root = fixtures();
    let mut db = database(&root).await;

    let err = db
        .execute(
            "SELECT count(*) AS n FROM members WHERE id = :id OR :id IS NULL",
            Args::Named(Default::default()),
        )
        .all(None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingArgument(ref id) if id == "id"));

    let err = db.execute("SELECT ? AS v", ()).all(None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ArgumentCount {
            expected: 1,
            got: 0
        }
    ));

    let err = db
        .execute("DELETE FROM members WHERE id = ?", ())
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Binding);
    assert_eq!(db.execute("SELECT id FROM members", ()).all(None).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_transaction_rollback() {
    let root = fixtures();
    let mut db = database(&root).await;

    db.begin().await.unwrap();
    db.execute("DELETE FROM members", ()).run().await.unwrap();
    db.rollback().await.unwrap();

    let rows = db
        .execute("SELECT id FROM members", ())
        .all(None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 5);
}
