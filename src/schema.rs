use crate::builder::{compile_create_index, compile_create_table};
use crate::error::{MapperError, Result};
use crate::fields::{Field, FieldDescriptor};
use std::collections::HashMap;
use std::sync::Arc;

/// Compiled, immutable description of one table
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    table_name: String,
    fields: Vec<(String, FieldDescriptor)>,
    partition_keys: Vec<String>,
    clustering_keys: Vec<String>,
    indexes: Vec<String>,
}

impl SchemaDescriptor {
    pub fn builder(table_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(table_name)
    }

    /// Describe a table as it exists in the database
    pub fn live(
        table_name: impl Into<String>,
        columns: Vec<(String, String)>,
        partition_keys: Vec<String>,
        clustering_keys: Vec<String>,
        indexes: Vec<String>,
    ) -> Result<Self> {
        let table_name = table_name.into();

        if partition_keys.is_empty() {
            return Err(MapperError::Schema(format!(
                "Table {} has no partition key in the catalog",
                table_name
            )));
        }

        let mut fields = Vec::with_capacity(columns.len());
        for (name, wire_type) in columns {
            let mut field = FieldDescriptor::from_wire_type(&wire_type);
            field.partition_key = partition_keys.contains(&name);
            field.clustering_key = clustering_keys.contains(&name);
            field.indexed = indexes.contains(&name);
            fields.push((name, field));
        }

        for key in partition_keys.iter().chain(clustering_keys.iter()) {
            if !fields.iter().any(|(name, _)| name == key) {
                return Err(MapperError::Schema(format!(
                    "Key column {} of table {} has no column definition",
                    key, table_name
                )));
            }
        }

        Ok(Self {
            table_name,
            fields,
            partition_keys,
            clustering_keys,
            indexes,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, field)| field)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn partition_keys(&self) -> &[String] {
        &self.partition_keys
    }

    pub fn clustering_keys(&self) -> &[String] {
        &self.clustering_keys
    }

    /// Partition keys followed by clustering keys
    pub fn primary_keys(&self) -> Vec<&str> {
        self.partition_keys
            .iter()
            .chain(self.clustering_keys.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_keys().contains(&name)
    }

    pub fn indexes(&self) -> &[String] {
        &self.indexes
    }
}

/// Builder for a declared model schema
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    table_name: String,
    fields: Vec<(String, Field)>,
}

impl SchemaBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field; order of calls is column order
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Declare several fields at once
    pub fn fields<N: Into<String>>(mut self, fields: impl IntoIterator<Item = (N, Field)>) -> Self {
        for (name, field) in fields {
            self.fields.push((name.into(), field));
        }
        self
    }

    /// Validate every field and the key layout
    pub fn build(self) -> Result<SchemaDescriptor> {
        if self.table_name.trim().is_empty() {
            return Err(MapperError::Validation("table name cannot be empty".to_string()));
        }

        if self.fields.is_empty() {
            return Err(MapperError::Validation(format!(
                "model {} declares no fields",
                self.table_name
            )));
        }

        let mut fields: Vec<(String, FieldDescriptor)> = Vec::with_capacity(self.fields.len());
        for (name, field) in self.fields {
            if fields.iter().any(|(existing, _)| *existing == name) {
                return Err(MapperError::Validation(format!(
                    "field '{}' declared twice in model {}",
                    name, self.table_name
                )));
            }

            let descriptor = field.build().map_err(|e| match e {
                MapperError::Validation(msg) => {
                    MapperError::Validation(format!("field '{}': {}", name, msg))
                }
                other => other,
            })?;
            fields.push((name, descriptor));
        }

        let partition_keys: Vec<String> = fields
            .iter()
            .filter(|(_, f)| f.partition_key)
            .map(|(name, _)| name.clone())
            .collect();

        if partition_keys.is_empty() {
            return Err(MapperError::Validation(format!(
                "model {} must declare at least one primary or partition key",
                self.table_name
            )));
        }

        let clustering_keys = fields
            .iter()
            .filter(|(_, f)| f.clustering_key)
            .map(|(name, _)| name.clone())
            .collect();

        let indexes = fields
            .iter()
            .filter(|(_, f)| f.indexed)
            .map(|(name, _)| name.clone())
            .collect();

        Ok(SchemaDescriptor {
            table_name: self.table_name,
            fields,
            partition_keys,
            clustering_keys,
            indexes,
        })
    }
}

/// Registry of declared models, keyed by table name
pub struct ModelRegistry {
    models: Vec<Arc<SchemaDescriptor>>,
    by_name: HashMap<String, usize>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a model schema
    pub fn register(&mut self, schema: SchemaDescriptor) -> Result<Arc<SchemaDescriptor>> {
        if self.by_name.contains_key(schema.table_name()) {
            return Err(MapperError::Validation(format!(
                "Model {} already registered",
                schema.table_name()
            )));
        }

        let schema = Arc::new(schema);
        self.by_name
            .insert(schema.table_name().to_string(), self.models.len());
        self.models.push(Arc::clone(&schema));

        Ok(schema)
    }

    pub fn get(&self, table_name: &str) -> Option<&Arc<SchemaDescriptor>> {
        self.by_name.get(table_name).map(|&i| &self.models[i])
    }

    /// Models in registration order
    pub fn models(&self) -> impl Iterator<Item = &Arc<SchemaDescriptor>> {
        self.models.iter()
    }

    pub fn list_models(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.table_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// CREATE TABLE and CREATE INDEX statements for every registered model
    pub fn generate_ddl(&self) -> Vec<String> {
        let mut ddl = Vec::new();

        for schema in &self.models {
            ddl.push(compile_create_table(schema).text);
            for field in schema.indexes() {
                ddl.push(compile_create_index(schema.table_name(), field).text);
            }
        }

        ddl
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
