use crate::backend::{Executor, QueryResult, QueryRow};
use crate::builder::{
    compile_batch, compile_collection_update, compile_count, compile_delete, compile_insert,
    compile_select, compile_update, split_filter_key, Assignments, Filter, FilterOp, SelectQuery,
    Statement,
};
use crate::config::MapperConfig;
use crate::error::{MapperError, Result};
use crate::fields::FieldKind;
use crate::schema::{ModelRegistry, SchemaDescriptor};
use crate::sync::{sync_table, SyncOptions, SyncReport};
use crate::value::{Record, Value};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Entry point for running model operations against one keyspace
pub struct Session<E: Executor> {
    executor: Arc<RwLock<E>>,
    keyspace: String,
    sync_options: SyncOptions,
}

impl<E: Executor> Clone for Session<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            keyspace: self.keyspace.clone(),
            sync_options: self.sync_options.clone(),
        }
    }
}

impl<E: Executor> Session<E> {
    pub fn new(executor: E, keyspace: impl Into<String>) -> Self {
        Self {
            executor: Arc::new(RwLock::new(executor)),
            keyspace: keyspace.into(),
            sync_options: SyncOptions::default(),
        }
    }

    pub fn from_config(executor: E, config: &MapperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            executor: Arc::new(RwLock::new(executor)),
            keyspace: config.keyspace.clone(),
            sync_options: config.sync.clone(),
        })
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Shared handle to the underlying executor
    pub fn executor(&self) -> Arc<RwLock<E>> {
        Arc::clone(&self.executor)
    }

    /// Run a compiled statement
    pub async fn execute(&self, statement: &Statement) -> Result<QueryResult> {
        let mut executor = self.executor.write().await;
        executor.run(statement).await
    }

    /// Reconcile one model with its table
    pub async fn sync_table(&self, schema: &SchemaDescriptor, auto_apply: bool) -> Result<SyncReport> {
        let options = SyncOptions {
            auto_apply,
            ..self.sync_options.clone()
        };
        self.sync_with(schema, &options).await
    }

    pub async fn sync_with(&self, schema: &SchemaDescriptor, options: &SyncOptions) -> Result<SyncReport> {
        let mut executor = self.executor.write().await;
        sync_table(&mut *executor, &self.keyspace, schema, options).await
    }

    /// Sync every registered model with the session's options, in registration order
    pub async fn sync_all(&self, registry: &ModelRegistry) -> Result<Vec<SyncReport>> {
        let mut reports = Vec::with_capacity(registry.len());
        for schema in registry.models() {
            reports.push(self.sync_with(schema, &self.sync_options).await?);
        }
        Ok(reports)
    }

    /// Insert one record, returning it with defaults filled in
    pub async fn insert(&self, schema: &SchemaDescriptor, record: Record) -> Result<Record> {
        let record = prepare_record(schema, record)?;
        self.execute(&compile_insert(schema, &record)?).await?;
        Ok(record)
    }

    /// Insert several records in one batch
    pub async fn bulk_insert(&self, schema: &SchemaDescriptor, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }

        let mut prepared = Vec::with_capacity(records.len());
        let mut statements = Vec::with_capacity(records.len());
        for record in records {
            let record = prepare_record(schema, record)?;
            statements.push(compile_insert(schema, &record)?);
            prepared.push(record);
        }

        let batch = compile_batch(&statements)?;
        debug!(table = schema.table_name(), rows = prepared.len(), "bulk insert");
        self.execute(&batch).await?;
        Ok(prepared)
    }

    /// Lazy query over a model's table
    pub fn objects<'a>(&'a self, schema: &'a SchemaDescriptor) -> QuerySet<'a, E> {
        QuerySet::new(self, schema)
    }

    /// Fetch the single record matching `filter`
    pub async fn get(&self, schema: &SchemaDescriptor, filter: Record) -> Result<Option<Record>> {
        let mut records = self.objects(schema).filters(filter).limit(2).all().await?;
        if records.len() > 1 {
            return Err(MapperError::Query(format!(
                "get() on {} matched more than one row",
                schema.table_name()
            )));
        }
        Ok(records.pop())
    }

    /// Set the given fields on the row identified by `pk`
    pub async fn update(&self, schema: &SchemaDescriptor, set: &Record, pk: &Record) -> Result<()> {
        let mut assignments = Assignments::new();
        for (name, value) in set.iter() {
            if schema.is_primary_key(name) {
                return Err(MapperError::Query(format!(
                    "primary key field '{}' cannot be updated",
                    name
                )));
            }
            assignments.insert(name.to_string(), field_to_wire(schema, name, value)?);
        }

        let pk_filters = primary_key_filter(schema, pk)?;
        self.execute(&compile_update(schema, &assignments, &pk_filters)?).await?;
        Ok(())
    }

    /// Add and/or remove elements of a list or set column in place
    pub async fn update_collection(
        &self,
        schema: &SchemaDescriptor,
        field: &str,
        add: Option<Vec<Value>>,
        remove: Option<Vec<Value>>,
        pk: &Record,
    ) -> Result<()> {
        let add = add.map(|items| collection_items(schema, field, &items)).transpose()?;
        let remove = remove
            .map(|items| collection_items(schema, field, &items))
            .transpose()?;
        let pk_filters = primary_key_filter(schema, pk)?;

        let statement = compile_collection_update(
            schema,
            field,
            add.as_deref(),
            remove.as_deref(),
            &pk_filters,
        )?;
        self.execute(&statement).await?;
        Ok(())
    }

    /// Delete the row a record was loaded from
    pub async fn delete_record(&self, schema: &SchemaDescriptor, record: &Record) -> Result<()> {
        let filter = primary_key_filter(schema, record)?;
        self.execute(&compile_delete(schema, &filter)?).await?;
        Ok(())
    }
}

/// Chainable query; nothing runs until `all`, `first`, `count`, `exists`,
/// `delete` or `update` is awaited
pub struct QuerySet<'a, E: Executor> {
    session: &'a Session<E>,
    schema: &'a SchemaDescriptor,
    filters: Vec<(String, Value)>,
    columns: Vec<String>,
    ordering: Vec<String>,
    limit: Option<u64>,
}

impl<E: Executor> Clone for QuerySet<'_, E> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            schema: self.schema,
            filters: self.filters.clone(),
            columns: self.columns.clone(),
            ordering: self.ordering.clone(),
            limit: self.limit,
        }
    }
}

impl<'a, E: Executor> QuerySet<'a, E> {
    fn new(session: &'a Session<E>, schema: &'a SchemaDescriptor) -> Self {
        Self {
            session,
            schema,
            filters: Vec::new(),
            columns: Vec::new(),
            ordering: Vec::new(),
            limit: None,
        }
    }

    /// Add a filter: `field` or `field__gt`, `field__in`, ...
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.filters.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.filters.push((key, value)),
        }
        self
    }

    /// Add every entry of a record as a filter
    pub fn filters(self, filter: Record) -> Self {
        filter
            .into_iter()
            .fold(self, |query, (key, value)| query.filter(key, value))
    }

    /// Project a subset of fields
    pub fn only(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn order_by(mut self, token: &str) -> Self {
        self.ordering.push(token.to_string());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compiled SELECT for this query
    pub fn statement(&self) -> Result<Statement> {
        compile_select(self.schema, &self.select_query()?)
    }

    pub async fn all(&self) -> Result<Vec<Record>> {
        let rows = self.session.execute(&self.statement()?).await?;
        rows.iter()
            .map(|row| record_from_row(self.schema, row, &self.columns))
            .collect()
    }

    pub async fn first(&self) -> Result<Option<Record>> {
        let mut records = self.clone().limit(1).all().await?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    pub async fn count(&self) -> Result<u64> {
        let statement = compile_count(self.schema, &self.wire_filter()?)?;
        let rows = self.session.execute(&statement).await?;
        Ok(rows.first().and_then(count_from_row).unwrap_or(0))
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.first().await?.is_some())
    }

    /// Delete the matching rows; the filter must cover the partition key
    pub async fn delete(&self) -> Result<()> {
        let statement = compile_delete(self.schema, &self.wire_filter()?)?;
        self.session.execute(&statement).await?;
        Ok(())
    }

    /// Set fields on the row selected by equality filters on the primary key
    pub async fn update(&self, set: &Record) -> Result<()> {
        let mut pk = Record::new();
        for (key, value) in &self.filters {
            let (field, op) = split_filter_key(key)?;
            if op != FilterOp::Exact {
                return Err(MapperError::Query(format!(
                    "update filters must be equality filters, got '{}'",
                    key
                )));
            }
            if !self.schema.is_primary_key(field) {
                return Err(MapperError::Query(format!(
                    "update can only filter on primary key fields, got '{}'",
                    field
                )));
            }
            pk.set(field, value.clone());
        }
        self.session.update(self.schema, set, &pk).await
    }

    fn wire_filter(&self) -> Result<Filter> {
        let mut filter = Filter::new();
        for (key, value) in &self.filters {
            filter.insert(key.clone(), filter_to_wire(self.schema, key, value)?);
        }
        Ok(filter)
    }

    fn select_query(&self) -> Result<SelectQuery> {
        let mut query = SelectQuery::new().filters(self.wire_filter()?);
        if !self.columns.is_empty() {
            query = query.only(self.columns.clone());
        }
        for token in &self.ordering {
            query = query.order_by(token);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

/// Apply defaults, enforce required fields and validate every value
fn prepare_record(schema: &SchemaDescriptor, mut record: Record) -> Result<Record> {
    if let Some(unknown) = record.names().find(|name| !schema.has_field(name)) {
        return Err(MapperError::Validation(format!(
            "unknown field '{}' for model {}",
            unknown,
            schema.table_name()
        )));
    }

    let mut prepared = Record::new();
    for (name, field) in schema.fields() {
        let value = match record.remove(name) {
            Some(value) if !value.is_null() => value,
            _ => match field.default_value() {
                Some(default) => default,
                None if field.required => {
                    return Err(MapperError::Validation(format!(
                        "field '{}' is required",
                        name
                    )))
                }
                None if field.is_key() => {
                    return Err(MapperError::Validation(format!(
                        "primary key field '{}' has no value",
                        name
                    )))
                }
                None => field.to_local(name, &JsonValue::Null)?,
            },
        };

        field.validate_value(name, &value)?;
        prepared.set(name, value);
    }

    Ok(prepared)
}

/// Map a result row to a record in schema order
fn record_from_row(schema: &SchemaDescriptor, row: &QueryRow, projection: &[String]) -> Result<Record> {
    let mut record = Record::new();
    for (name, field) in schema.fields() {
        if !projection.is_empty() && !projection.iter().any(|c| c == name) {
            continue;
        }
        let wire = row.value(name).unwrap_or(&JsonValue::Null);
        record.set(name, field.to_local(name, wire)?);
    }
    Ok(record)
}

fn count_from_row(row: &QueryRow) -> Option<u64> {
    row.value("count")
        .or_else(|| row.columns.values().next())
        .and_then(JsonValue::as_u64)
}

fn field_to_wire(schema: &SchemaDescriptor, name: &str, value: &Value) -> Result<JsonValue> {
    let field = schema.field(name).ok_or_else(|| {
        MapperError::Query(format!("unknown field '{}' in {}", name, schema.table_name()))
    })?;
    field.to_wire(name, value)
}

/// Encode a filter value with its field's rules; `in` encodes each element
fn filter_to_wire(schema: &SchemaDescriptor, key: &str, value: &Value) -> Result<JsonValue> {
    let (name, op) = split_filter_key(key)?;
    let field = match schema.field(name) {
        Some(field) => field,
        None => return Ok(value.to_json()),
    };

    if op != FilterOp::In {
        return field.to_wire(name, value);
    }

    let items = value.as_slice().ok_or_else(|| {
        MapperError::invalid_filter(key, format!("the 'in' operator expects a list, got {}", value.type_name()))
    })?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| field.to_wire(&format!("{}[{}]", name, i), item))
        .collect::<Result<Vec<_>>>()
        .map(JsonValue::Array)
}

/// Encode elements for a collection add/remove
fn collection_items(schema: &SchemaDescriptor, field: &str, items: &[Value]) -> Result<Vec<JsonValue>> {
    match schema.field(field).map(|f| &f.kind) {
        Some(FieldKind::List(inner)) | Some(FieldKind::Set(inner)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| inner.to_wire(&format!("{}[{}]", field, i), item))
            .collect(),
        _ => Ok(items.iter().map(Value::to_json).collect()),
    }
}

/// Equality filter on every primary key field, taken from `record`
fn primary_key_filter(schema: &SchemaDescriptor, record: &Record) -> Result<Filter> {
    let mut filter = Filter::new();
    for name in schema.primary_keys() {
        let value = match record.get(name) {
            Some(value) if !value.is_null() => value,
            _ => {
                return Err(MapperError::Query(format!(
                    "record has no value for primary key field '{}'",
                    name
                )))
            }
        };
        filter.insert(name.to_string(), field_to_wire(schema, name, value)?);
    }
    Ok(filter)
}
