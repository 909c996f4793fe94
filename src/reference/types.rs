use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};

/// A table row as column name to JSON value
pub type Row = Map<String, Value>;

/// Reference tables of the organizational hierarchy, top to bottom
pub const TABLES: &[&str] = &[
  "pais",
  "empresa",
  "fundo",
  "ubicacion",
  "nodo",
  "sensor",
  "metrica",
];

/// Columns of each reference table, matching `SCHEMA`
pub const COLUMNS: &[(&str, &[&str])] = &[
  ("pais", &["paisid", "pais", "paisabrev", "statusid"]),
  (
    "empresa",
    &["empresaid", "paisid", "empresa", "empresabrev", "statusid"],
  ),
  (
    "fundo",
    &["fundoid", "empresaid", "fundo", "fundoabrev", "statusid"],
  ),
  ("ubicacion", &["ubicacionid", "fundoid", "ubicacion", "statusid"]),
  ("nodo", &["nodoid", "ubicacionid", "nodo", "statusid"]),
  ("sensor", &["sensorid", "nodoid", "tipoid", "statusid"]),
  ("metrica", &["metricaid", "metrica", "unidad", "statusid"]),
];

/// Schema for reference tables.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pais (
    paisid INTEGER PRIMARY KEY,
    pais TEXT NOT NULL,
    paisabrev TEXT,
    statusid INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS empresa (
    empresaid INTEGER PRIMARY KEY,
    paisid INTEGER NOT NULL REFERENCES pais(paisid),
    empresa TEXT NOT NULL,
    empresabrev TEXT,
    statusid INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS fundo (
    fundoid INTEGER PRIMARY KEY,
    empresaid INTEGER NOT NULL REFERENCES empresa(empresaid),
    fundo TEXT NOT NULL,
    fundoabrev TEXT,
    statusid INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS ubicacion (
    ubicacionid INTEGER PRIMARY KEY,
    fundoid INTEGER NOT NULL REFERENCES fundo(fundoid),
    ubicacion TEXT NOT NULL,
    statusid INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS nodo (
    nodoid INTEGER PRIMARY KEY,
    ubicacionid INTEGER NOT NULL REFERENCES ubicacion(ubicacionid),
    nodo TEXT NOT NULL,
    statusid INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS sensor (
    sensorid INTEGER PRIMARY KEY,
    nodoid INTEGER NOT NULL REFERENCES nodo(nodoid),
    tipoid INTEGER NOT NULL,
    statusid INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS metrica (
    metricaid INTEGER PRIMARY KEY,
    metrica TEXT NOT NULL,
    unidad TEXT,
    statusid INTEGER NOT NULL DEFAULT 1
);
"#;

/// Sample hierarchy inserted by `seed`.
pub const SEED: &str = r#"
INSERT INTO pais (paisid, pais, paisabrev) VALUES
    (1, 'Peru', 'PE'),
    (2, 'Chile', 'CL');
INSERT INTO empresa (empresaid, paisid, empresa, empresabrev) VALUES
    (1, 1, 'Agricola Andina', 'AA'),
    (2, 1, 'Valle Verde', 'VV'),
    (3, 2, 'Frutos del Sur', 'FS');
INSERT INTO fundo (fundoid, empresaid, fundo, fundoabrev) VALUES
    (1, 1, 'Fundo Ica', 'ICA'),
    (2, 1, 'Fundo Nazca', 'NAZ'),
    (3, 3, 'Fundo Rancagua', 'RAN');
INSERT INTO ubicacion (ubicacionid, fundoid, ubicacion) VALUES
    (1, 1, 'Lote A'),
    (2, 1, 'Lote B'),
    (3, 3, 'Invernadero 1');
INSERT INTO nodo (nodoid, ubicacionid, nodo) VALUES
    (1, 1, 'RLS-001'),
    (2, 2, 'RLS-002'),
    (3, 3, 'RLS-003');
INSERT INTO sensor (sensorid, nodoid, tipoid) VALUES
    (1, 1, 1),
    (2, 1, 2),
    (3, 2, 1),
    (4, 3, 3);
INSERT INTO metrica (metricaid, metrica, unidad) VALUES
    (1, 'Humedad', '%'),
    (2, 'Temperatura', 'C'),
    (3, 'Electroconductividad', 'uS/cm');
"#;

/// Check that `name` is a plain SQL identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
  let mut chars = name.chars();
  let valid_start = chars
    .next()
    .map(|c| c.is_ascii_alphabetic() || c == '_')
    .unwrap_or(false);

  if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
    Ok(())
  } else {
    Err(eyre!("Invalid identifier: {:?}", name))
  }
}

/// Check that `table` is one of the reference tables.
pub fn validate_table(table: &str) -> Result<()> {
  validate_identifier(table)?;
  if TABLES.contains(&table) {
    Ok(())
  } else {
    Err(eyre!(
      "Unknown table '{}'. Known tables: {}",
      table,
      TABLES.join(", ")
    ))
  }
}

/// Check that `column` exists on the reference table `table`.
///
/// SQLite reads an unknown double-quoted identifier as a string literal, so
/// every column must be checked here before it reaches SQL.
pub fn validate_column(table: &str, column: &str) -> Result<()> {
  validate_table(table)?;
  validate_identifier(column)?;

  let columns = COLUMNS
    .iter()
    .find(|(name, _)| *name == table)
    .map(|(_, columns)| *columns)
    .ok_or_else(|| eyre!("No column list for table '{}'", table))?;

  if columns.contains(&column) {
    Ok(())
  } else {
    Err(eyre!(
      "Unknown column '{}' on {}. Columns: {}",
      column,
      table,
      columns.join(", ")
    ))
  }
}
