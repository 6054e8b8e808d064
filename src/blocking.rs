//! Synchronous wrapper around [`Session`] for callers without an async runtime.
//!
//! Every call drives the async operation to completion on a private
//! current-thread runtime, so the statements sent are the same as the async API.

use crate::backend::{Executor, QueryResult};
use crate::builder::Statement;
use crate::config::MapperConfig;
use crate::error::Result;
use crate::query::{QuerySet, Session};
use crate::schema::{ModelRegistry, SchemaDescriptor};
use crate::sync::SyncReport;
use crate::value::{Record, Value};
use tokio::runtime::{Builder, Runtime};

pub struct BlockingSession<E: Executor> {
    runtime: Runtime,
    session: Session<E>,
}

impl<E: Executor> BlockingSession<E> {
    pub fn new(executor: E, keyspace: impl Into<String>) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            session: Session::new(executor, keyspace),
        })
    }

    pub fn from_config(executor: E, config: &MapperConfig) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            session: Session::from_config(executor, config)?,
        })
    }

    /// The async session this wrapper drives
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    pub fn execute(&self, statement: &Statement) -> Result<QueryResult> {
        self.runtime.block_on(self.session.execute(statement))
    }

    pub fn sync_table(&self, schema: &SchemaDescriptor, auto_apply: bool) -> Result<SyncReport> {
        self.runtime.block_on(self.session.sync_table(schema, auto_apply))
    }

    pub fn sync_all(&self, registry: &ModelRegistry) -> Result<Vec<SyncReport>> {
        self.runtime.block_on(self.session.sync_all(registry))
    }

    pub fn insert(&self, schema: &SchemaDescriptor, record: Record) -> Result<Record> {
        self.runtime.block_on(self.session.insert(schema, record))
    }

    pub fn bulk_insert(&self, schema: &SchemaDescriptor, records: Vec<Record>) -> Result<Vec<Record>> {
        self.runtime.block_on(self.session.bulk_insert(schema, records))
    }

    pub fn get(&self, schema: &SchemaDescriptor, filter: Record) -> Result<Option<Record>> {
        self.runtime.block_on(self.session.get(schema, filter))
    }

    pub fn update(&self, schema: &SchemaDescriptor, set: &Record, pk: &Record) -> Result<()> {
        self.runtime.block_on(self.session.update(schema, set, pk))
    }

    pub fn update_collection(
        &self,
        schema: &SchemaDescriptor,
        field: &str,
        add: Option<Vec<Value>>,
        remove: Option<Vec<Value>>,
        pk: &Record,
    ) -> Result<()> {
        self.runtime
            .block_on(self.session.update_collection(schema, field, add, remove, pk))
    }

    pub fn delete_record(&self, schema: &SchemaDescriptor, record: &Record) -> Result<()> {
        self.runtime.block_on(self.session.delete_record(schema, record))
    }

    pub fn objects<'a>(&'a self, schema: &'a SchemaDescriptor) -> BlockingQuerySet<'a, E> {
        BlockingQuerySet {
            runtime: &self.runtime,
            inner: self.session.objects(schema),
        }
    }
}

fn build_runtime() -> Result<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

/// [`QuerySet`] whose terminal operations block
pub struct BlockingQuerySet<'a, E: Executor> {
    runtime: &'a Runtime,
    inner: QuerySet<'a, E>,
}

impl<'a, E: Executor> BlockingQuerySet<'a, E> {
    pub fn filter(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map(|q| q.filter(key, value))
    }

    pub fn filters(self, filter: Record) -> Self {
        self.map(|q| q.filters(filter))
    }

    pub fn only(self, columns: &[&str]) -> Self {
        self.map(|q| q.only(columns))
    }

    pub fn order_by(self, token: &str) -> Self {
        self.map(|q| q.order_by(token))
    }

    pub fn limit(self, limit: u64) -> Self {
        self.map(|q| q.limit(limit))
    }

    pub fn statement(&self) -> Result<Statement> {
        self.inner.statement()
    }

    pub fn all(&self) -> Result<Vec<Record>> {
        self.runtime.block_on(self.inner.all())
    }

    pub fn first(&self) -> Result<Option<Record>> {
        self.runtime.block_on(self.inner.first())
    }

    pub fn count(&self) -> Result<u64> {
        self.runtime.block_on(self.inner.count())
    }

    pub fn exists(&self) -> Result<bool> {
        self.runtime.block_on(self.inner.exists())
    }

    pub fn delete(&self) -> Result<()> {
        self.runtime.block_on(self.inner.delete())
    }

    pub fn update(&self, set: &Record) -> Result<()> {
        self.runtime.block_on(self.inner.update(set))
    }

    fn map(self, f: impl FnOnce(QuerySet<'a, E>) -> QuerySet<'a, E>) -> Self {
        Self {
            runtime: self.runtime,
            inner: f(self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueryRow;
    use crate::fields::Field;
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};

    struct MockExecutor {
        executed: Vec<String>,
    }

    #[async_trait]
    impl Executor for MockExecutor {
        type Prepared = String;

        async fn prepare(&mut self, statement: &str) -> Result<String> {
            Ok(statement.to_string())
        }

        async fn execute(&mut self, prepared: &String, _params: &[JsonValue]) -> Result<QueryResult> {
            self.executed.push(prepared.clone());
            if prepared.starts_with("SELECT COUNT") {
                return Ok(vec![QueryRow::new().with("count", json!(2))]);
            }
            Ok(vec![])
        }
    }

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::builder("notes")
            .field("id", Field::uuid().primary_key())
            .field("body", Field::text())
            .build()
            .unwrap()
    }

    #[test]
    fn test_blocking_operations() {
        let session = BlockingSession::new(MockExecutor { executed: Vec::new() }, "app").unwrap();
        let schema = schema();

        let note = session.insert(&schema, Record::new().with("body", "hi")).unwrap();
        assert!(note.get("id").and_then(Value::as_uuid).is_some());

        assert_eq!(session.objects(&schema).filter("body", "hi").count().unwrap(), 2);
        assert!(session.objects(&schema).all().unwrap().is_empty());

        let executor = session.session().executor();
        let executed = session.runtime.block_on(async { executor.read().await.executed.clone() });
        assert_eq!(
            executed,
            vec![
                "INSERT INTO notes (id, body) VALUES (?, ?)".to_string(),
                "SELECT COUNT(*) FROM notes WHERE body = ? ALLOW FILTERING".to_string(),
                "SELECT * FROM notes".to_string(),
            ]
        );
    }

    #[test]
    fn test_statement_matches_async_api() {
        let session = BlockingSession::new(MockExecutor { executed: Vec::new() }, "app").unwrap();
        let schema = schema();

        let blocking = session.objects(&schema).order_by("-id").limit(5).statement().unwrap();
        let async_stmt = session
            .session()
            .objects(&schema)
            .order_by("-id")
            .limit(5)
            .statement()
            .unwrap();
        assert_eq!(blocking, async_stmt);
    }
}
