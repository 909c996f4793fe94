//! Query keys: the `(table, limit, filters)` shape a cached result is indexed by.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Equality filters applied to a table query, column name to value.
pub type Filters = Map<String, Value>;

/// The logical shape of a table query.
///
/// Two keys built from the same table, limit and structurally equal filters
/// always derive the same cache key, regardless of the order in which the
/// filter fields were inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryKey {
  pub table: String,
  pub limit: Option<u64>,
  pub filters: Filters,
}

impl QueryKey {
  /// Key for an unbounded, unfiltered read of `table`.
  pub fn table(table: impl Into<String>) -> Self {
    Self {
      table: table.into(),
      limit: None,
      filters: Filters::new(),
    }
  }

  pub fn with_limit(mut self, limit: u64) -> Self {
    self.limit = Some(limit);
    self
  }

  #[cfg(test)]
  pub fn with_filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
    self.filters.insert(column.into(), value.into());
    self
  }

  pub fn with_filters(mut self, filters: Filters) -> Self {
    self.filters = filters;
    self
  }

  /// Derive the cache key string: `table:limit:digest`.
  ///
  /// The digest is a SHA-256 over the canonical filter serialization, so the
  /// key stays fixed-length however large the filter object gets.
  pub fn cache_key(&self) -> String {
    let limit = self
      .limit
      .map(|l| l.to_string())
      .unwrap_or_else(|| "all".to_string());

    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&Value::Object(self.filters.clone())).as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}:{}:{}", self.table, limit, digest)
  }

  /// Human-readable description for logs and shell output.
  pub fn description(&self) -> String {
    let mut out = self.table.clone();
    if let Some(limit) = self.limit {
      out.push_str(&format!(" limit {}", limit));
    }
    if !self.filters.is_empty() {
      out.push_str(&format!(" where {}", canonical_json(&Value::Object(self.filters.clone()))));
    }
    out
  }
}

/// Serialize a JSON value with object keys sorted at every depth.
///
/// `serde_json` map iteration order depends on its `preserve_order` feature,
/// so keys are sorted here explicitly.
pub fn canonical_json(value: &Value) -> String {
  match value {
    Value::Object(map) => {
      let mut fields: Vec<(&String, &Value)> = map.iter().collect();
      fields.sort_by(|a, b| a.0.cmp(b.0));
      let body = fields
        .into_iter()
        .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
        .collect::<Vec<_>>()
        .join(",");
      format!("{{{}}}", body)
    }
    Value::Array(items) => {
      let body = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
      format!("[{}]", body)
    }
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_key_is_deterministic() {
    let a = QueryKey::table("pais").with_limit(10).with_filter("statusid", 1);
    let b = QueryKey::table("pais").with_limit(10).with_filter("statusid", 1);
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_filter_order_does_not_change_key() {
    let a = QueryKey::table("fundo")
      .with_filter("a", 1)
      .with_filter("b", 2);
    let b = QueryKey::table("fundo")
      .with_filter("b", 2)
      .with_filter("a", 1);
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_nested_filter_order_does_not_change_key() {
    let a = json!({"outer": {"x": 1, "y": [ {"p": 1, "q": 2} ]}});
    let b = json!({"outer": {"y": [ {"q": 2, "p": 1} ], "x": 1}});
    assert_eq!(canonical_json(&a), canonical_json(&b));
  }

  #[test]
  fn test_limit_and_table_are_part_of_key() {
    let base = QueryKey::table("nodo");
    assert_ne!(base.cache_key(), base.clone().with_limit(5).cache_key());
    assert_ne!(base.cache_key(), QueryKey::table("sensor").cache_key());
    assert!(base.cache_key().starts_with("nodo:all:"));
  }

  #[test]
  fn test_different_filter_values_differ() {
    let a = QueryKey::table("empresa").with_filter("paisid", 1);
    let b = QueryKey::table("empresa").with_filter("paisid", 2);
    assert_ne!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_description() {
    let key = QueryKey::table("empresa")
      .with_limit(3)
      .with_filter("paisid", 1);
    assert_eq!(key.description(), r#"empresa limit 3 where {"paisid":1}"#);
  }
}
