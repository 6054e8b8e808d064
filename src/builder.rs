use crate::error::{MapperError, Result};
use crate::fields::FieldKind;
use crate::schema::SchemaDescriptor;
use crate::value::{Record, Value};
use serde_json::Value as JsonValue;
use std::fmt;
use tracing::{debug, warn};

/// Filter expression: `field` or `field__operator` to wire value, in insertion order
pub type Filter = serde_json::Map<String, JsonValue>;

/// Column assignments for UPDATE, in insertion order
pub type Assignments = serde_json::Map<String, JsonValue>;

/// Compiled statement text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<JsonValue>,
}

impl Statement {
    pub fn new(text: impl Into<String>, params: Vec<JsonValue>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    /// Statement without bound parameters (DDL)
    pub fn ddl(text: impl Into<String>) -> Self {
        Self::new(text, Vec::new())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Filter operators accepted after `__` in a filter key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Exact,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl FilterOp {
    pub const ALL: [FilterOp; 6] = [
        FilterOp::Exact,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::In,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            FilterOp::Exact => "exact",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
        }
    }

    pub fn parse(token: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.token() == token)
            .ok_or_else(|| MapperError::UnsupportedOperator {
                operator: token.to_string(),
                valid: Self::ALL
                    .iter()
                    .map(|op| op.token())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Exact => write!(f, "="),
            FilterOp::Gt => write!(f, ">"),
            FilterOp::Gte => write!(f, ">="),
            FilterOp::Lt => write!(f, "<"),
            FilterOp::Lte => write!(f, "<="),
            FilterOp::In => write!(f, "IN"),
        }
    }
}

/// Split `age__gt` into (`age`, Gt); a bare name means Exact
pub fn split_filter_key(key: &str) -> Result<(&str, FilterOp)> {
    match key.split_once("__") {
        Some((field, op)) => Ok((field, FilterOp::parse(op)?)),
        None => Ok((key, FilterOp::Exact)),
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// ORDER BY entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    /// Parse an ordering token: `name` ascending, `-name` descending
    pub fn parse(token: &str) -> Self {
        match token.strip_prefix('-') {
            Some(column) => Self {
                column: column.to_string(),
                direction: SortDirection::Desc,
            },
            None => Self {
                column: token.to_string(),
                direction: SortDirection::Asc,
            },
        }
    }

    pub fn to_cql(&self) -> String {
        format!("{} {}", self.column, self.direction)
    }
}

/// SELECT parameters: projection, filter, ordering and limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub columns: Vec<String>,
    pub filter: Filter,
    pub ordering: Vec<OrderBy>,
    pub limit: Option<u64>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project specific columns instead of `*`
    pub fn only(mut self, columns: Vec<impl Into<String>>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add a filter entry (`field` or `field__op`)
    pub fn filter(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.filter.insert(key.into(), value);
        self
    }

    /// Merge a whole filter expression
    pub fn filters(mut self, filter: Filter) -> Self {
        self.filter.extend(filter);
        self
    }

    /// Add an ordering token (`-field` for descending)
    pub fn order_by(mut self, token: &str) -> Self {
        self.ordering.push(OrderBy::parse(token));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compile against a schema
    pub fn build(&self, schema: &SchemaDescriptor) -> Result<Statement> {
        compile_select(schema, self)
    }
}

/// Render WHERE clauses for a filter, pushing parameters in order
fn compile_where(filter: &Filter, params: &mut Vec<JsonValue>) -> Result<Vec<String>> {
    let mut clauses = Vec::with_capacity(filter.len());

    for (key, value) in filter {
        let (field, op) = split_filter_key(key)?;

        if op == FilterOp::In {
            let items = value.as_array().ok_or_else(|| {
                MapperError::invalid_filter(
                    key.as_str(),
                    format!("the 'in' operator expects a list, got {}", value),
                )
            })?;
            let placeholders = vec!["?"; items.len()].join(", ");
            clauses.push(format!("{} IN ({})", field, placeholders));
            params.extend(items.iter().cloned());
        } else {
            clauses.push(format!("{} {} ?", field, op));
            params.push(value.clone());
        }
    }

    Ok(clauses)
}

fn compile_pk_where(pk_filters: &Filter, params: &mut Vec<JsonValue>) -> String {
    let clauses: Vec<String> = pk_filters.keys().map(|key| format!("{} = ?", key)).collect();
    params.extend(pk_filters.values().cloned());
    clauses.join(" AND ")
}

/// INSERT covering every declared field in schema order
pub fn compile_insert(schema: &SchemaDescriptor, record: &Record) -> Result<Statement> {
    let mut columns = Vec::new();
    let mut params = Vec::new();

    for (name, field) in schema.fields() {
        let value = record.get(name).cloned().unwrap_or(Value::Null);
        columns.push(name);
        params.push(field.to_wire(name, &value)?);
    }

    let text = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table_name(),
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    );

    debug!(statement = %text, "compiled insert");
    Ok(Statement::new(text, params))
}

/// SELECT ... WHERE ... ORDER BY ... LIMIT ? [ALLOW FILTERING]
pub fn compile_select(schema: &SchemaDescriptor, query: &SelectQuery) -> Result<Statement> {
    let projection = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(", ")
    };

    let mut text = format!("SELECT {} FROM {}", projection, schema.table_name());
    let mut params = Vec::new();

    if !query.filter.is_empty() {
        let clauses = compile_where(&query.filter, &mut params)?;
        text.push_str(" WHERE ");
        text.push_str(&clauses.join(" AND "));
    }

    if !query.ordering.is_empty() {
        let clustering_keys = schema.clustering_keys();
        for order in &query.ordering {
            if !clustering_keys.is_empty() && !clustering_keys.contains(&order.column) {
                warn!(
                    table = schema.table_name(),
                    column = %order.column,
                    "ordering by a column that is not a clustering key; the query may be rejected"
                );
            }
        }

        text.push_str(" ORDER BY ");
        text.push_str(
            &query
                .ordering
                .iter()
                .map(OrderBy::to_cql)
                .collect::<Vec<_>>()
                .join(", "),
        );
    }

    // LIMIT 0 means no limit
    if let Some(limit) = query.limit.filter(|&limit| limit > 0) {
        text.push_str(" LIMIT ?");
        params.push(JsonValue::from(limit));
    }

    if !query.filter.is_empty() {
        text.push_str(" ALLOW FILTERING");
    }

    debug!(statement = %text, params = params.len(), "compiled select");
    Ok(Statement::new(text, params))
}

/// SELECT COUNT(*) with the same filter handling as SELECT
pub fn compile_count(schema: &SchemaDescriptor, filter: &Filter) -> Result<Statement> {
    let mut text = format!("SELECT COUNT(*) FROM {}", schema.table_name());
    let mut params = Vec::new();

    if !filter.is_empty() {
        let clauses = compile_where(filter, &mut params)?;
        text.push_str(" WHERE ");
        text.push_str(&clauses.join(" AND "));
        text.push_str(" ALLOW FILTERING");
    }

    debug!(statement = %text, "compiled count");
    Ok(Statement::new(text, params))
}

/// UPDATE ... SET ... WHERE; SET parameters precede WHERE parameters
pub fn compile_update(
    schema: &SchemaDescriptor,
    update_data: &Assignments,
    pk_filters: &Filter,
) -> Result<Statement> {
    if update_data.is_empty() {
        return Err(MapperError::Query("UPDATE requires at least one field to set".to_string()));
    }

    if pk_filters.is_empty() {
        return Err(MapperError::Query(
            "UPDATE requires primary key filters for its WHERE clause".to_string(),
        ));
    }

    let set_clause = update_data
        .keys()
        .map(|field| format!("{} = ?", field))
        .collect::<Vec<_>>()
        .join(", ");

    let mut params: Vec<JsonValue> = update_data.values().cloned().collect();
    let where_clause = compile_pk_where(pk_filters, &mut params);

    let text = format!(
        "UPDATE {} SET {} WHERE {}",
        schema.table_name(),
        set_clause,
        where_clause
    );

    debug!(statement = %text, "compiled update");
    Ok(Statement::new(text, params))
}

/// Atomic add/remove on a list or set column
pub fn compile_collection_update(
    schema: &SchemaDescriptor,
    field: &str,
    add: Option<&[JsonValue]>,
    remove: Option<&[JsonValue]>,
    pk_filters: &Filter,
) -> Result<Statement> {
    let add = add.filter(|items| !items.is_empty());
    let remove = remove.filter(|items| !items.is_empty());

    if add.is_none() && remove.is_none() {
        return Err(MapperError::Query(
            "collection update requires 'add' or 'remove' values".to_string(),
        ));
    }

    match schema.field(field).map(|f| &f.kind) {
        Some(FieldKind::List(_)) | Some(FieldKind::Set(_)) => {}
        Some(_) => {
            return Err(MapperError::Query(format!(
                "field '{}' is not a list or set",
                field
            )))
        }
        None => {
            return Err(MapperError::Query(format!(
                "unknown field '{}' in {}",
                field,
                schema.table_name()
            )))
        }
    }

    if pk_filters.is_empty() {
        return Err(MapperError::Query(
            "collection update requires primary key filters".to_string(),
        ));
    }

    let mut set_clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(items) = add {
        set_clauses.push(format!("{0} = {0} + ?", field));
        params.push(JsonValue::Array(items.to_vec()));
    }

    if let Some(items) = remove {
        set_clauses.push(format!("{0} = {0} - ?", field));
        params.push(JsonValue::Array(items.to_vec()));
    }

    let where_clause = compile_pk_where(pk_filters, &mut params);

    let text = format!(
        "UPDATE {} SET {} WHERE {}",
        schema.table_name(),
        set_clauses.join(", "),
        where_clause
    );

    debug!(statement = %text, "compiled collection update");
    Ok(Statement::new(text, params))
}

/// DELETE pinned to the full partition key
pub fn compile_delete(schema: &SchemaDescriptor, filter: &Filter) -> Result<Statement> {
    if filter.is_empty() {
        return Err(MapperError::Query(
            "deletion without a WHERE clause is not permitted for safety".to_string(),
        ));
    }

    let mut filtered_fields = Vec::with_capacity(filter.len());
    for key in filter.keys() {
        filtered_fields.push(split_filter_key(key)?.0);
    }

    let missing: Vec<&str> = schema
        .partition_keys()
        .iter()
        .map(String::as_str)
        .filter(|pk| !filtered_fields.contains(pk))
        .collect();

    if !missing.is_empty() {
        return Err(MapperError::Query(format!(
            "DELETE must specify every partition key field; missing: {}",
            missing.join(", ")
        )));
    }

    let mut params = Vec::new();
    let clauses = compile_where(filter, &mut params)?;
    let text = format!(
        "DELETE FROM {} WHERE {}",
        schema.table_name(),
        clauses.join(" AND ")
    );

    debug!(statement = %text, "compiled delete");
    Ok(Statement::new(text, params))
}

/// Render the PRIMARY KEY clause contents
fn primary_key_clause(schema: &SchemaDescriptor) -> String {
    let partition = schema.partition_keys();
    let partition_group = if partition.len() == 1 {
        partition[0].clone()
    } else {
        format!("({})", partition.join(", "))
    };

    std::iter::once(partition_group)
        .chain(schema.clustering_keys().iter().cloned())
        .collect::<Vec<_>>()
        .join(", ")
}

/// CREATE TABLE IF NOT EXISTS with the composite key grouping
pub fn compile_create_table(schema: &SchemaDescriptor) -> Statement {
    let columns: Vec<String> = schema
        .fields()
        .map(|(name, field)| format!("{} {}", name, field.wire_type_name()))
        .collect();

    Statement::ddl(format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
        schema.table_name(),
        columns.join(", "),
        primary_key_clause(schema)
    ))
}

pub fn compile_add_column(table: &str, column: &str, wire_type: &str) -> Statement {
    Statement::ddl(format!("ALTER TABLE {} ADD {} {}", table, column, wire_type))
}

pub fn compile_drop_column(table: &str, column: &str) -> Statement {
    Statement::ddl(format!("ALTER TABLE {} DROP {}", table, column))
}

/// Secondary index named `<table>_<field>_idx`
pub fn compile_create_index(table: &str, field: &str) -> Statement {
    Statement::ddl(format!(
        "CREATE INDEX IF NOT EXISTS {0}_{1}_idx ON {0} ({1})",
        table, field
    ))
}

/// Wrap statements in a logged batch, concatenating their parameters
pub fn compile_batch(statements: &[Statement]) -> Result<Statement> {
    if statements.is_empty() {
        return Err(MapperError::Query("a batch needs at least one statement".to_string()));
    }

    let mut text = String::from("BEGIN BATCH ");
    let mut params = Vec::new();

    for statement in statements {
        text.push_str(&statement.text);
        text.push_str("; ");
        params.extend(statement.params.iter().cloned());
    }
    text.push_str("APPLY BATCH");

    Ok(Statement::new(text, params))
}

/// Catalog read of a table's columns
pub fn compile_catalog_columns(keyspace: &str, table: &str) -> Statement {
    Statement::new(
        "SELECT column_name, kind, position, type FROM system_schema.columns \
         WHERE keyspace_name = ? AND table_name = ?",
        vec![JsonValue::from(keyspace), JsonValue::from(table)],
    )
}

/// Catalog read of a table's secondary indexes
pub fn compile_catalog_indexes(keyspace: &str, table: &str) -> Statement {
    Statement::new(
        "SELECT index_name, options FROM system_schema.indexes \
         WHERE keyspace_name = ? AND table_name = ?",
        vec![JsonValue::from(keyspace), JsonValue::from(table)],
    )
}
