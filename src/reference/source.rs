//! SQLite-backed source for reference tables.

use color_eyre::{eyre::eyre, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::cache::QueryKey;

use super::types::{validate_column, validate_table, Row, SCHEMA, SEED};

/// Reference data source over a local SQLite database.
pub struct SqliteSource {
  conn: Mutex<Connection>,
}

impl SqliteSource {
  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;
    info!(path = %path.display(), "opened reference database");

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let source = Self {
      conn: Mutex::new(conn),
    };
    source.run_migrations()?;
    Ok(source)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for reference tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))
  }

  /// Insert the sample hierarchy unless `pais` already has rows.
  ///
  /// Returns whether anything was inserted.
  pub fn seed(&self) -> Result<bool> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM pais", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count pais rows: {}", e))?;

    if count > 0 {
      return Ok(false);
    }

    conn
      .execute_batch(&format!("BEGIN;{}COMMIT;", SEED))
      .map_err(|e| eyre!("Failed to seed reference data: {}", e))?;
    info!("seeded reference data");
    Ok(true)
  }

  /// Read rows matching `key`'s equality filters, up to its limit.
  pub fn fetch_rows(&self, key: &QueryKey) -> Result<Vec<Row>> {
    validate_table(&key.table)?;

    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for (column, value) in &key.filters {
      validate_column(&key.table, column)?;
      match value {
        Value::Null => clauses.push(format!("\"{}\" IS NULL", column)),
        other => {
          clauses.push(format!("\"{}\" = ?", column));
          params.push(to_sql(other)?);
        }
      }
    }

    let mut sql = format!("SELECT * FROM \"{}\"", key.table);
    if !clauses.is_empty() {
      sql.push_str(" WHERE ");
      sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY rowid");
    if let Some(limit) = key.limit {
      sql.push_str(" LIMIT ?");
      params.push(SqlValue::Integer(limit_to_i64(limit)));
    }
    debug!(%sql, "fetching rows");

    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare query on {}: {}", key.table, e))?;

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let rows = stmt
      .query_map(params_from_iter(params), |row| {
        let mut out = Row::new();
        for (i, column) in columns.iter().enumerate() {
          out.insert(column.clone(), from_sql(row.get_ref(i)?));
        }
        Ok(out)
      })
      .map_err(|e| eyre!("Failed to query {}: {}", key.table, e))?
      .collect::<rusqlite::Result<Vec<Row>>>()
      .map_err(|e| eyre!("Failed to read row from {}: {}", key.table, e))?;

    Ok(rows)
  }

  /// Insert `row` into `table`, returning the new rowid.
  pub fn insert_row(&self, table: &str, row: &Row) -> Result<i64> {
    validate_table(table)?;
    if row.is_empty() {
      return Err(eyre!("Cannot insert an empty row into {}", table));
    }

    let mut columns = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len());
    for (column, value) in row {
      validate_column(table, column)?;
      columns.push(format!("\"{}\"", column));
      params.push(to_sql(value)?);
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
      "INSERT INTO \"{}\" ({}) VALUES ({})",
      table,
      columns.join(", "),
      placeholders
    );

    let conn = self.lock()?;
    conn
      .execute(&sql, params_from_iter(params))
      .map_err(|e| eyre!("Failed to insert into {}: {}", table, e))?;

    Ok(conn.last_insert_rowid())
  }
}

fn limit_to_i64(limit: u64) -> i64 {
  i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Convert a JSON scalar to a SQLite value.
fn to_sql(value: &Value) -> Result<SqlValue> {
  match value {
    Value::Null => Ok(SqlValue::Null),
    Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
    Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        Ok(SqlValue::Integer(i))
      } else if let Some(f) = n.as_f64() {
        Ok(SqlValue::Real(f))
      } else {
        Err(eyre!("Unsupported number: {}", n))
      }
    }
    Value::String(s) => Ok(SqlValue::Text(s.clone())),
    other => Err(eyre!("Only scalar values are supported, got {}", other)),
  }
}

/// Convert a SQLite column value to JSON.
fn from_sql(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::from(i),
    ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
    ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => Value::String(hex::encode(b)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn seeded() -> SqliteSource {
    let source = SqliteSource::open_in_memory().unwrap();
    assert!(source.seed().unwrap());
    source
  }

  #[test]
  fn test_seed_is_idempotent() {
    let source = seeded();
    assert!(!source.seed().unwrap());
    assert_eq!(source.fetch_rows(&QueryKey::table("pais")).unwrap().len(), 2);
  }

  #[test]
  fn test_fetch_all_rows() {
    let source = seeded();
    let rows = source.fetch_rows(&QueryKey::table("pais")).unwrap();

    assert_eq!(rows[0]["paisid"], json!(1));
    assert_eq!(rows[0]["pais"], json!("Peru"));
    assert_eq!(rows[1]["paisabrev"], json!("CL"));
  }

  #[test]
  fn test_fetch_with_filters_and_limit() {
    let source = seeded();

    let peru = QueryKey::table("empresa").with_filter("paisid", 1);
    assert_eq!(source.fetch_rows(&peru).unwrap().len(), 2);

    let limited = peru.clone().with_limit(1);
    let rows = source.fetch_rows(&limited).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["empresa"], json!("Agricola Andina"));

    let none = QueryKey::table("empresa").with_filter("paisabrev", json!(null));
    assert!(source.fetch_rows(&none).is_err(), "empresa has no paisabrev column");

    let unnamed = QueryKey::table("fundo").with_filter("fundoabrev", json!(null));
    assert!(source.fetch_rows(&unnamed).unwrap().is_empty());
  }

  #[test]
  fn test_unknown_filter_column_is_error() {
    let source = seeded();

    // Would otherwise compare the literal text 'bogus' and match every row
    let text = QueryKey::table("pais").with_filter("bogus", "bogus");
    assert!(source.fetch_rows(&text).is_err());

    let number = QueryKey::table("pais").with_filter("bogus", 1);
    assert!(source.fetch_rows(&number).is_err());
  }

  #[test]
  fn test_insert_row() {
    let source = seeded();
    let mut row = Row::new();
    row.insert("pais".into(), json!("Colombia"));
    row.insert("paisabrev".into(), json!("CO"));

    let id = source.insert_row("pais", &row).unwrap();
    assert_eq!(id, 3);

    let rows = source
      .fetch_rows(&QueryKey::table("pais").with_filter("paisabrev", "CO"))
      .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["statusid"], json!(1));
  }

  #[test]
  fn test_rejects_unknown_table_and_bad_columns() {
    let source = seeded();
    assert!(source.fetch_rows(&QueryKey::table("usuario")).is_err());

    let injected = QueryKey::table("pais").with_filter("1=1 OR paisid", 1);
    assert!(source.fetch_rows(&injected).is_err());

    let mut row = Row::new();
    row.insert("pais".into(), json!("Uruguay"));
    row.insert("capital".into(), json!("Montevideo"));
    assert!(source.insert_row("pais", &row).is_err());

    let mut row = Row::new();
    row.insert("pais".into(), json!(["not", "scalar"]));
    assert!(source.insert_row("pais", &row).is_err());
    assert!(source.insert_row("pais", &Row::new()).is_err());
  }
}
