//! Query execution.
//!
//! A [`Query`] pairs SQL text with its [`Args`] and borrows the
//! [`Database`] it runs on. Placeholders are compiled to the driver's
//! native positional form right before execution; statements left with
//! nothing to bind are sent unprepared so that multi-statement scripts
//! work on every driver.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde_json::{Map, Number};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::{Arguments, Column, Row};
use tracing::{debug, info};

use crate::args::{Args, Value};
use crate::config::{Driver, FetchMode};
use crate::database::{Database, PrintTarget};
use crate::error::{Error, Result};
use crate::lexer::{self, CodePart};

const RULE: &str = "-----------------------------------------------";

/// SQL with placeholders rewritten for a driver and the values to bind,
/// in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// The rewritten statement.
    pub sql: String,
    /// Values in binding order.
    pub values: Vec<Value>,
}

impl CompiledQuery {
    /// Builds the driver arguments.
    ///
    /// # Errors
    ///
    /// Fails if a value cannot be encoded.
    pub fn arguments(&self) -> Result<AnyArguments<'static>> {
        let mut arguments = AnyArguments::default();
        for value in &self.values {
            let added = match value {
                Value::Null => arguments.add(None::<String>),
                Value::Bool(b) => arguments.add(*b),
                Value::Int(n) => arguments.add(*n),
                Value::Text(s) => arguments.add(s.clone()),
                Value::Array(v) => arguments.add(serde_json::to_string(v)?),
            };
            added.map_err(sqlx::Error::Encode)?;
        }
        Ok(arguments)
    }
}

/// Rewrites `:name` and `?` placeholders into the driver's positional form.
///
/// Placeholders of the kind not matching `args` are left as they are, as
/// is everything inside literals, comments and dollar-quoted blocks.
///
/// # Errors
///
/// - [`Error::MissingArgument`] for a named placeholder without a value
/// - [`Error::UnusedArgument`] for a named value the statement never uses
/// - [`Error::ArgumentCount`] if the number of `?` differs from the values
pub fn compile(sql: &str, args: &Args, driver: Driver) -> Result<CompiledQuery> {
    let mut out = String::with_capacity(sql.len());
    let mut values: Vec<Value> = Vec::with_capacity(args.len());
    let mut used: BTreeSet<&str> = BTreeSet::new();
    let mut positional = 0usize;

    let push_placeholder = |out: &mut String, values: &mut Vec<Value>, value: Value| {
        values.push(value);
        match driver {
            Driver::Postgres => {
                out.push('$');
                out.push_str(&values.len().to_string());
            }
            Driver::Sqlite | Driver::MySql => out.push('?'),
        }
    };

    for segment in lexer::segments(sql) {
        if segment.is_protected() {
            out.push_str(segment.text);
            continue;
        }
        for part in lexer::code_parts(segment.text) {
            match (part, args) {
                (CodePart::Text(text), _) => out.push_str(text),
                (CodePart::Positional, Args::Positional(list)) => {
                    positional += 1;
                    match list.get(positional - 1) {
                        Some(value) => push_placeholder(&mut out, &mut values, value.clone()),
                        None => out.push('?'),
                    }
                }
                (CodePart::Named(name), Args::Named(map)) => {
                    let (key, value) = map
                        .get_key_value(name)
                        .ok_or_else(|| Error::MissingArgument(name.to_string()))?;
                    used.insert(key.as_str());
                    push_placeholder(&mut out, &mut values, value.clone());
                }
                (CodePart::Positional, Args::Named(_)) => out.push('?'),
                (CodePart::Named(name), Args::Positional(_)) => {
                    out.push(':');
                    out.push_str(name);
                }
            }
        }
    }

    match args {
        Args::Positional(list) if positional != list.len() => {
            return Err(Error::ArgumentCount {
                expected: positional,
                got: list.len(),
            });
        }
        Args::Named(map) => {
            if let Some(unused) = map.keys().find(|k| !used.contains(k.as_str())) {
                return Err(Error::UnusedArgument(unused.clone()));
            }
        }
        Args::Positional(_) => {}
    }

    Ok(CompiledQuery { sql: out, values })
}

/// Substitutes argument values into `sql` for display.
///
/// For debugging only: strings are quoted without escaping. Literals,
/// comments and dollar-quoted blocks are restored verbatim.
#[must_use]
pub fn interpolate(sql: &str, args: &Args) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut positional = match args {
        Args::Positional(list) => list.as_slice(),
        Args::Named(_) => &[],
    }
    .iter();

    for segment in lexer::segments(sql) {
        if segment.is_protected() {
            out.push_str(segment.text);
            continue;
        }
        for part in lexer::code_parts(segment.text) {
            match part {
                CodePart::Text(text) => out.push_str(text),
                CodePart::Positional => match positional.next() {
                    Some(value) => out.push_str(&value.to_debug_sql()),
                    None => out.push('?'),
                },
                CodePart::Named(name) => match args {
                    Args::Named(map) if map.contains_key(name) => {
                        out.push_str(&map[name].to_debug_sql());
                    }
                    _ => {
                        out.push(':');
                        out.push_str(name);
                    }
                },
            }
        }
    }
    out
}

/// A statement bound to its arguments, ready to run on a [`Database`].
pub struct Query<'db> {
    db: &'db mut Database,
    sql: String,
    args: Args,
    cursor: Option<VecDeque<AnyRow>>,
}

impl<'db> Query<'db> {
    pub(crate) fn new(db: &'db mut Database, sql: String, args: Args) -> Self {
        let query = Self {
            db,
            sql,
            args,
            cursor: None,
        };
        if query.db.print() {
            let interpolated = query.interpolate();
            match query.db.print_target() {
                PrintTarget::Stdout => print!("\n\n{RULE}\n\n{interpolated}\n{RULE}-\n"),
                PrintTarget::Log => info!(sql = %interpolated, "Query"),
            }
        }
        query
    }

    /// The SQL text as given.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bound arguments.
    #[must_use]
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Returns the next row, executing the statement on the first call.
    ///
    /// Later calls advance through the same result set and return `None`
    /// once it is exhausted. The first call buffers the whole result set,
    /// so page through large tables with `LIMIT` rather than with `one`.
    pub async fn one(&mut self, mode: Option<FetchMode>) -> Result<Option<serde_json::Value>> {
        let mode = mode.unwrap_or_else(|| self.db.fetch_mode());
        if self.cursor.is_none() {
            let rows = self.fetch_rows().await?;
            self.cursor = Some(rows.into());
        }
        match self.cursor.as_mut().and_then(VecDeque::pop_front) {
            Some(row) => row_to_json(&row, mode).map(Some),
            None => Ok(None),
        }
    }

    /// Executes the statement and returns every row.
    pub async fn all(&mut self, mode: Option<FetchMode>) -> Result<Vec<serde_json::Value>> {
        let mode = mode.unwrap_or_else(|| self.db.fetch_mode());
        self.fetch_rows()
            .await?
            .iter()
            .map(|row| row_to_json(row, mode))
            .collect()
    }

    /// Executes the statement for its side effects.
    pub async fn run(&mut self) -> Result<bool> {
        self.execute().await.map(|_| true)
    }

    /// Executes the statement and returns the number of affected rows.
    ///
    /// SQLite reports 0 for SELECT statements.
    pub async fn len(&mut self) -> Result<u64> {
        self.execute().await
    }

    /// The statement with argument values substituted in, for display only.
    #[must_use]
    pub fn interpolate(&self) -> String {
        interpolate(&self.sql, &self.args)
    }

    async fn fetch_rows(&mut self) -> Result<Vec<AnyRow>> {
        let compiled = compile(&self.sql, &self.args, self.db.driver())?;
        let conn = self.db.connection().await?;
        if compiled.values.is_empty() {
            debug!(sql = %self.sql, "Fetching");
            return Ok(sqlx::raw_sql(&self.sql).fetch_all(conn).await?);
        }
        debug!(sql = %compiled.sql, "Fetching");
        let arguments = compiled.arguments()?;
        Ok(sqlx::query_with(&compiled.sql, arguments)
            .fetch_all(conn)
            .await?)
    }

    async fn execute(&mut self) -> Result<u64> {
        let compiled = compile(&self.sql, &self.args, self.db.driver())?;
        let conn = self.db.connection().await?;
        if compiled.values.is_empty() {
            debug!(sql = %self.sql, "Executing");
            let result = sqlx::raw_sql(&self.sql).execute(conn).await?;
            return Ok(result.rows_affected());
        }
        debug!(sql = %compiled.sql, "Executing");
        let arguments = compiled.arguments()?;
        let result = sqlx::query_with(&compiled.sql, arguments)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}

impl fmt::Display for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.interpolate())
    }
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("sql", &self.sql)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Converts a row into the requested shape.
fn row_to_json(row: &AnyRow, mode: FetchMode) -> Result<serde_json::Value> {
    let mut values = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        values.push(decode_column(row, i)?);
    }

    let shaped = match mode {
        FetchMode::Num => serde_json::Value::Array(values),
        FetchMode::Assoc | FetchMode::Both => {
            let mut map = Map::new();
            for (i, (column, value)) in row.columns().iter().zip(values).enumerate() {
                if mode == FetchMode::Both {
                    map.insert(i.to_string(), value.clone());
                }
                map.insert(column.name().to_string(), value);
            }
            serde_json::Value::Object(map)
        }
    };
    Ok(shaped)
}

fn decode_column(row: &AnyRow, i: usize) -> Result<serde_json::Value> {
    use serde_json::Value as Json;

    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return Ok(v.map_or(Json::Null, Json::from));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return Ok(v.and_then(Number::from_f64).map_or(Json::Null, Json::Number));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return Ok(v.map_or(Json::Null, Json::Bool));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return Ok(v.map_or(Json::Null, Json::String));
    }
    let bytes = row.try_get::<Option<Vec<u8>>, _>(i)?;
    Ok(bytes.map_or(Json::Null, |b| {
        Json::String(String::from_utf8_lossy(&b).into_owned())
    }))
}
