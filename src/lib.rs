//! cql-orm - Object mapper core for wide-column (CQL) databases
//!
//! cql-orm turns declared model schemas into parameterized CQL statements,
//! marshals values between local and wire forms, and reconciles declared
//! models with the tables that already exist in a keyspace.
//!
//! # Architecture
//!
//! - **Field Type Registry** (`fields`): column types, options and value conversion
//! - **Statement Compiler** (`builder`): pure functions from schema + arguments to text + params
//! - **Schema Differ** (`diff`): declared vs. live table comparison
//! - **Schema Synchronizer** (`sync`): creates missing tables, adds missing columns
//! - **Query Execution Facade** (`query`, `blocking`): model operations over an [`Executor`]
//!
//! Connection management belongs to the [`Executor`] implementation; this crate
//! only compiles statements and interprets results.
//!
//! # Example
//!
//! ```rust,no_run
//! use cql_orm::prelude::*;
//!
//! async fn run<E: Executor>(executor: E) -> Result<()> {
//!     let users = SchemaDescriptor::builder("users")
//!         .field("id", Field::uuid().primary_key())
//!         .field("name", Field::text().required())
//!         .field("email", Field::text().index())
//!         .field("tags", Field::list(Field::text()))
//!         .build()?;
//!
//!     let session = Session::new(executor, "app");
//!     session.sync_table(&users, true).await?;
//!
//!     let alice = session
//!         .insert(&users, Record::new().with("name", "Alice"))
//!         .await?;
//!
//!     let adults = session
//!         .objects(&users)
//!         .filter("name__in", vec!["Alice", "Bob"])
//!         .limit(10)
//!         .all()
//!         .await?;
//!     println!("{} matching users", adults.len());
//!
//!     session
//!         .update_collection(&users, "tags", Some(vec!["admin".into()]), None, &alice)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Schema changes
//!
//! Sync only ever adds tables, columns and indexes. Removed columns, type
//! changes and primary key changes are logged with the statement an operator
//! would need to run by hand.

pub mod backend;
pub mod blocking;
pub mod builder;
pub mod config;
pub mod diff;
pub mod error;
pub mod fields;
pub mod query;
pub mod schema;
pub mod sync;
pub mod value;

pub use backend::{schema_from_catalog, Executor, QueryResult, QueryRow};
pub use blocking::{BlockingQuerySet, BlockingSession};
pub use builder::{
    compile_batch, compile_collection_update, compile_count, compile_create_index,
    compile_create_table, compile_delete, compile_insert, compile_select, compile_update,
    Assignments, Filter, FilterOp, OrderBy, SelectQuery, SortDirection, Statement,
};
pub use config::MapperConfig;
pub use diff::{diff_schemas, SchemaDiff};
pub use error::{MapperError, Result};
pub use fields::{normalize_wire_type, DefaultValue, Field, FieldDescriptor, FieldKind};
pub use query::{QuerySet, Session};
pub use schema::{ModelRegistry, SchemaBuilder, SchemaDescriptor};
pub use sync::{sync_table, SyncOptions, SyncOutcome, SyncReport};
pub use value::{Record, Value};

/// Prelude for common imports
pub mod prelude {
    pub use crate::backend::{Executor, QueryResult, QueryRow};
    pub use crate::builder::{Filter, SelectQuery, Statement};
    pub use crate::error::{MapperError, Result};
    pub use crate::fields::Field;
    pub use crate::query::{QuerySet, Session};
    pub use crate::schema::{ModelRegistry, SchemaDescriptor};
    pub use crate::sync::{SyncOptions, SyncOutcome, SyncReport};
    pub use crate::value::{Record, Value};
}
