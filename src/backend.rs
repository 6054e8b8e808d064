use crate::builder::{compile_catalog_columns, compile_catalog_indexes, Statement};
use crate::error::{MapperError, Result};
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Row from a query result
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub columns: HashMap<String, Value>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self {
            columns: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.columns.insert(key.into(), value);
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Raw wire value of a column
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.columns.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.columns
            .get(key)
            .and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.columns.get(key).and_then(|v| v.as_i64())
    }

}

impl Default for QueryRow {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for QueryRow {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Result of a query
pub type QueryResult = Vec<QueryRow>;

/// Executor collaborator: prepares and runs statements against the cluster.
///
/// Connection handling, pooling, retries and timeouts belong to the
/// implementation. Parameters are positional and bound in order.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Driver-specific prepared statement handle
    type Prepared: Send + Sync;

    /// Prepare a statement
    async fn prepare(&mut self, statement: &str) -> Result<Self::Prepared>;

    /// Execute a prepared statement with positional parameters
    async fn execute(&mut self, prepared: &Self::Prepared, params: &[Value]) -> Result<QueryResult>;

    /// Describe a live table, or `None` when it does not exist.
    ///
    /// The default reads `system_schema.columns` and `system_schema.indexes`.
    async fn introspect_schema(
        &mut self,
        keyspace: &str,
        table: &str,
    ) -> Result<Option<SchemaDescriptor>> {
        let columns = self.run(&compile_catalog_columns(keyspace, table)).await?;
        if columns.is_empty() {
            return Ok(None);
        }

        let indexes = self.run(&compile_catalog_indexes(keyspace, table)).await?;
        schema_from_catalog(table, &columns, &indexes).map(Some)
    }

    /// Prepare and execute a compiled statement.
    ///
    /// Failures are returned as [`MapperError::Execution`] carrying the
    /// statement and parameters, with the executor error as the source.
    async fn run(&mut self, statement: &Statement) -> Result<QueryResult> {
        let prepared = match self.prepare(&statement.text).await {
            Ok(prepared) => prepared,
            Err(e) => return Err(execution_failed(statement, e)),
        };

        self.execute(&prepared, &statement.params)
            .await
            .map_err(|e| execution_failed(statement, e))
    }
}

fn execution_failed(statement: &Statement, source: MapperError) -> MapperError {
    debug!(
        statement = %statement.text,
        params = ?statement.params,
        error = %source,
        "statement execution failed"
    );
    MapperError::execution(&statement.text, &statement.params, source)
}

/// Build a live schema from `system_schema.columns` and `system_schema.indexes` rows
pub fn schema_from_catalog(
    table: &str,
    column_rows: &[QueryRow],
    index_rows: &[QueryRow],
) -> Result<SchemaDescriptor> {
    let mut partition: Vec<(i64, String)> = Vec::new();
    let mut clustering: Vec<(i64, String)> = Vec::new();
    let mut regular: Vec<String> = Vec::new();
    let mut types: HashMap<String, String> = HashMap::new();

    for row in column_rows {
        let name = row
            .get_string("column_name")
            .ok_or_else(|| MapperError::Schema(format!("catalog row for {} has no column_name", table)))?;
        let wire_type = row
            .get_string("type")
            .ok_or_else(|| MapperError::Schema(format!("catalog row for {}.{} has no type", table, name)))?;
        let kind = row.get_string("kind").unwrap_or_else(|| "regular".to_string());
        let position = row.get_i64("position").unwrap_or(-1);

        match kind.as_str() {
            "partition_key" => partition.push((position, name.clone())),
            "clustering" => clustering.push((position, name.clone())),
            _ => regular.push(name.clone()),
        }
        types.insert(name, wire_type);
    }

    partition.sort();
    clustering.sort();
    regular.sort();

    let partition_keys: Vec<String> = partition.into_iter().map(|(_, n)| n).collect();
    let clustering_keys: Vec<String> = clustering.into_iter().map(|(_, n)| n).collect();

    let columns = partition_keys
        .iter()
        .chain(clustering_keys.iter())
        .chain(regular.iter())
        .map(|name| (name.clone(), types.get(name).cloned().unwrap_or_default()))
        .collect();

    let mut indexes = Vec::new();
    for row in index_rows {
        if let Some(target) = row
            .value("options")
            .and_then(|options| options.get("target"))
            .and_then(Value::as_str)
        {
            let column = index_target_column(target);
            if !indexes.contains(&column) {
                indexes.push(column);
            }
        }
    }

    SchemaDescriptor::live(table, columns, partition_keys, clustering_keys, indexes)
}

/// `values(tags)` / `"Name"` -> column name
fn index_target_column(target: &str) -> String {
    let inner = match (target.find('('), target.ends_with(')')) {
        (Some(open), true) => &target[open + 1..target.len() - 1],
        _ => target,
    };
    inner.trim().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn column(name: &str, kind: &str, position: i64, ty: &str) -> QueryRow {
        QueryRow::new()
            .with("column_name", json!(name))
            .with("kind", json!(kind))
            .with("position", json!(position))
            .with("type", json!(ty))
    }

    #[test]
    fn test_query_row_accessors() {
        let row = QueryRow::new()
            .with("name", json!("Alice"))
            .with("score", json!(1500));

        assert_eq!(row.get_string("name"), Some("Alice".to_string()));
        assert_eq!(row.get_i64("score"), Some(1500));
        assert_eq!(row.get_i64("name"), None);
        assert_eq!(row.get_string("missing"), None);
    }

    #[test]
    fn test_schema_from_catalog() {
        let columns = vec![
            column("body", "regular", -1, "text"),
            column("seq", "clustering", 1, "int"),
            column("bucket", "partition_key", 1, "text"),
            column("user_id", "partition_key", 0, "uuid"),
            column("posted_at", "clustering", 0, "timestamp"),
            column("tags", "regular", -1, "set<text>"),
        ];
        let indexes = vec![QueryRow::new()
            .with("index_name", json!("timeline_tags_idx"))
            .with("options", json!({"target": "values(tags)"}))];

        let schema = schema_from_catalog("timeline", &columns, &indexes).unwrap();

        assert_eq!(schema.primary_keys(), vec!["user_id", "bucket", "posted_at", "seq"]);
        assert_eq!(
            schema.field_names(),
            vec!["user_id", "bucket", "posted_at", "seq", "body", "tags"]
        );
        assert_eq!(schema.indexes(), &["tags".to_string()]);
        assert_eq!(schema.field("tags").unwrap().wire_type_name(), "set<text>");
    }

    #[test]
    fn test_schema_from_catalog_requires_names() {
        let columns = vec![QueryRow::new().with("kind", json!("regular"))];
        let err = schema_from_catalog("t", &columns, &[]).unwrap_err();
        assert!(matches!(err, MapperError::Schema(_)));
    }

    #[test]
    fn test_index_target_column() {
        assert_eq!(index_target_column("email"), "email");
        assert_eq!(index_target_column("keys(scores)"), "scores");
        assert_eq!(index_target_column("\"Email\""), "Email");
    }
}
