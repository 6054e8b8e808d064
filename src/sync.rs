use crate::backend::Executor;
use crate::builder::{
    compile_add_column, compile_create_index, compile_create_table, compile_drop_column,
};
use crate::diff::{diff_schemas, SchemaDiff};
use crate::error::Result;
use crate::schema::SchemaDescriptor;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Options for reconciling a declared model with its table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Add missing columns instead of only reporting them
    pub auto_apply: bool,
    /// Log progress at info level
    pub verbose: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            auto_apply: false,
            verbose: true,
        }
    }
}

impl SyncOptions {
    pub fn apply() -> Self {
        Self {
            auto_apply: true,
            ..Default::default()
        }
    }

    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }
}

/// Path taken by a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Table did not exist and was created
    Created,
    /// Table matched the model
    InSync,
    /// Differences found, missing columns added
    Applied,
    /// Differences found and reported only
    Reported,
}

/// What a sync run observed and did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub table: String,
    pub outcome: SyncOutcome,
    pub diff: SchemaDiff,
    pub added_columns: Vec<String>,
    pub failed_columns: Vec<String>,
    pub created_indexes: Vec<String>,
    pub failed_indexes: Vec<String>,
}

impl SyncReport {
    fn new(table: &str, outcome: SyncOutcome) -> Self {
        Self {
            table: table.to_string(),
            outcome,
            diff: SchemaDiff::default(),
            added_columns: Vec::new(),
            failed_columns: Vec::new(),
            created_indexes: Vec::new(),
            failed_indexes: Vec::new(),
        }
    }

    /// Whether every attempted statement succeeded
    pub fn is_clean(&self) -> bool {
        self.failed_columns.is_empty() && self.failed_indexes.is_empty()
    }
}

/// Bring the live table for `schema` in line with the model.
///
/// Only additive changes are ever executed. Dropped columns, type changes and
/// primary key changes are logged for the operator and left untouched.
pub async fn sync_table<E: Executor>(
    executor: &mut E,
    keyspace: &str,
    schema: &SchemaDescriptor,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let table = schema.table_name();

    let live = match executor.introspect_schema(keyspace, table).await? {
        Some(live) => live,
        None => return create_table(executor, schema, options).await,
    };

    let diff = diff_schemas(schema, &live);
    if diff.is_empty() {
        if options.verbose {
            info!(table, "schema is in sync");
        }
        return Ok(SyncReport::new(table, SyncOutcome::InSync));
    }

    let mut report = if options.auto_apply {
        apply_diff(executor, schema, &diff, options).await
    } else {
        report_diff(table, &diff, options);
        SyncReport::new(table, SyncOutcome::Reported)
    };
    report.diff = diff;

    Ok(report)
}

async fn create_table<E: Executor>(
    executor: &mut E,
    schema: &SchemaDescriptor,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let table = schema.table_name();
    let mut report = SyncReport::new(table, SyncOutcome::Created);

    if options.verbose {
        info!(table, "table not found, creating");
    }
    executor.run(&compile_create_table(schema)).await?;

    for field in schema.indexes() {
        create_index(executor, table, field, options, &mut report).await;
    }

    Ok(report)
}

/// Index failures are recorded, never propagated
async fn create_index<E: Executor>(
    executor: &mut E,
    table: &str,
    field: &str,
    options: &SyncOptions,
    report: &mut SyncReport,
) {
    match executor.run(&compile_create_index(table, field)).await {
        Ok(_) => {
            if options.verbose {
                info!(table, field, "created index");
            }
            report.created_indexes.push(field.to_string());
        }
        Err(e) => {
            warn!(table, field, error = %e, "failed to create index");
            report.failed_indexes.push(field.to_string());
        }
    }
}

async fn apply_diff<E: Executor>(
    executor: &mut E,
    schema: &SchemaDescriptor,
    diff: &SchemaDiff,
    options: &SyncOptions,
) -> SyncReport {
    let table = schema.table_name();
    let mut report = SyncReport::new(table, SyncOutcome::Applied);

    for column in &diff.added_in_model {
        let field = match schema.field(column) {
            Some(field) => field,
            None => continue,
        };
        let wire_type = field.wire_type_name();

        let statement = compile_add_column(table, column, wire_type);
        debug!(statement = %statement, "adding column");
        match executor.run(&statement).await {
            Ok(_) => {
                if options.verbose {
                    info!(table, column = %column, wire_type, "added column");
                }
                report.added_columns.push(column.clone());
            }
            Err(e) => {
                error!(table, column = %column, error = %e, "failed to add column");
                report.failed_columns.push(column.clone());
                continue;
            }
        }

        if field.indexed {
            create_index(executor, table, column, options, &mut report).await;
        }
    }

    for column in &diff.removed_from_model {
        warn!(
            table,
            column = %column,
            manual = %compile_drop_column(table, column),
            "column no longer in model; drop it manually if intended"
        );
    }

    for mismatch in &diff.type_mismatch {
        warn!(table, "{}; change the column type manually", mismatch);
    }

    for mismatch in &diff.pk_mismatch {
        error!(
            table,
            "{}; the table must be recreated to change its primary key",
            mismatch
        );
    }

    report
}

fn report_diff(table: &str, diff: &SchemaDiff, options: &SyncOptions) {
    warn!(
        table,
        added = diff.added_in_model.len(),
        removed = diff.removed_from_model.len(),
        type_mismatch = diff.type_mismatch.len(),
        pk_mismatch = !diff.pk_mismatch.is_empty(),
        "schema differs from model"
    );

    if options.verbose {
        for column in &diff.added_in_model {
            info!(table, column = %column, "missing from table");
        }
        for column in &diff.removed_from_model {
            info!(table, column = %column, "not in model");
        }
    }
    for mismatch in diff.type_mismatch.iter().chain(diff.pk_mismatch.iter()) {
        warn!(table, "{}", mismatch);
    }

    if options.verbose {
        info!(table, "no changes applied; run sync with auto_apply to add missing columns");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueryResult;
    use crate::error::MapperError;
    use crate::fields::Field;
    use async_trait::async_trait;
    use serde_json::Value;

    struct MockExecutor {
        executed: Vec<String>,
        live: Option<SchemaDescriptor>,
        fail_on: Vec<String>,
    }

    impl MockExecutor {
        fn new(live: Option<SchemaDescriptor>) -> Self {
            Self {
                executed: Vec::new(),
                live,
                fail_on: Vec::new(),
            }
        }

        fn failing_on(mut self, fragment: &str) -> Self {
            self.fail_on.push(fragment.to_string());
            self
        }
    }

    #[async_trait]
    impl Executor for MockExecutor {
        type Prepared = String;

        async fn prepare(&mut self, statement: &str) -> crate::error::Result<String> {
            Ok(statement.to_string())
        }

        async fn execute(
            &mut self,
            prepared: &String,
            _params: &[Value],
        ) -> crate::error::Result<QueryResult> {
            if self.fail_on.iter().any(|f| prepared.contains(f.as_str())) {
                return Err(MapperError::Database("rejected".to_string()));
            }
            self.executed.push(prepared.clone());
            Ok(vec![])
        }

        async fn introspect_schema(
            &mut self,
            _keyspace: &str,
            _table: &str,
        ) -> crate::error::Result<Option<SchemaDescriptor>> {
            Ok(self.live.clone())
        }
    }

    fn user_schema() -> SchemaDescriptor {
        SchemaDescriptor::builder("users")
            .field("id", Field::uuid().primary_key())
            .field("name", Field::text().required())
            .field("email", Field::text().index())
            .field("age", Field::integer())
            .build()
            .unwrap()
    }

    fn live(columns: &[(&str, &str)], pk: &[&str]) -> SchemaDescriptor {
        SchemaDescriptor::live(
            "users",
            columns
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
            pk.iter().map(|s| s.to_string()).collect(),
            vec![],
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_creates_missing_table_and_indexes() {
        let mut executor = MockExecutor::new(None);
        let report = sync_table(&mut executor, "app", &user_schema(), &SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome, SyncOutcome::Created);
        assert_eq!(executor.executed.len(), 2);
        assert!(executor.executed[0].starts_with("CREATE TABLE IF NOT EXISTS users"));
        assert!(executor.executed[0].contains("PRIMARY KEY (id)"));
        assert_eq!(
            executor.executed[1],
            "CREATE INDEX IF NOT EXISTS users_email_idx ON users (email)"
        );
        assert_eq!(report.created_indexes, vec!["email"]);
    }

    #[tokio::test]
    async fn test_index_failure_is_swallowed() {
        let mut executor = MockExecutor::new(None).failing_on("CREATE INDEX");
        let report = sync_table(&mut executor, "app", &user_schema(), &SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome, SyncOutcome::Created);
        assert_eq!(report.failed_indexes, vec!["email"]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_create_table_failure_propagates() {
        let mut executor = MockExecutor::new(None).failing_on("CREATE TABLE");
        let err = sync_table(&mut executor, "app", &user_schema(), &SyncOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MapperError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_in_sync_table_is_untouched() {
        let table = live(
            &[("id", "uuid"), ("name", "text"), ("email", "text"), ("age", "int")],
            &["id"],
        );
        let mut executor = MockExecutor::new(Some(table));
        let report = sync_table(&mut executor, "app", &user_schema(), &SyncOptions::apply())
            .await
            .unwrap();

        assert_eq!(report.outcome, SyncOutcome::InSync);
        assert!(executor.executed.is_empty());
    }

    #[tokio::test]
    async fn test_auto_apply_adds_columns_only() {
        let table = live(&[("id", "uuid"), ("name", "text"), ("extra", "text")], &["id"]);
        let mut executor = MockExecutor::new(Some(table));
        let report = sync_table(&mut executor, "app", &user_schema(), &SyncOptions::apply())
            .await
            .unwrap();

        assert_eq!(report.outcome, SyncOutcome::Applied);
        assert_eq!(
            executor.executed,
            vec![
                "ALTER TABLE users ADD email text".to_string(),
                "CREATE INDEX IF NOT EXISTS users_email_idx ON users (email)".to_string(),
                "ALTER TABLE users ADD age int".to_string(),
            ]
        );
        assert_eq!(report.created_indexes, vec!["email"]);
        assert_eq!(report.diff.removed_from_model, vec!["extra"]);
        assert!(!executor.executed.iter().any(|s| s.contains("DROP")));
    }

    #[tokio::test]
    async fn test_failed_column_does_not_stop_the_rest() {
        let table = live(&[("id", "uuid"), ("name", "text")], &["id"]);
        let mut executor = MockExecutor::new(Some(table)).failing_on("ADD email");
        let report = sync_table(&mut executor, "app", &user_schema(), &SyncOptions::apply())
            .await
            .unwrap();

        assert_eq!(report.failed_columns, vec!["email"]);
        assert_eq!(report.added_columns, vec!["age"]);
        assert_eq!(executor.executed, vec!["ALTER TABLE users ADD age int".to_string()]);
    }

    #[tokio::test]
    async fn test_report_only_executes_nothing() {
        let table = live(&[("id", "uuid"), ("name", "text")], &["id"]);
        let mut executor = MockExecutor::new(Some(table));
        let report = sync_table(
            &mut executor,
            "app",
            &user_schema(),
            &SyncOptions::default().quiet(),
        )
        .await
        .unwrap();

        assert_eq!(report.outcome, SyncOutcome::Reported);
        assert_eq!(report.diff.added_in_model, vec!["email", "age"]);
        assert!(report.added_columns.is_empty());
        assert!(executor.executed.is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_reported_not_applied() {
        let table = live(
            &[("id", "uuid"), ("name", "text"), ("email", "text"), ("age", "bigint")],
            &["id"],
        );
        let mut executor = MockExecutor::new(Some(table));
        let report = sync_table(&mut executor, "app", &user_schema(), &SyncOptions::apply())
            .await
            .unwrap();

        assert_eq!(report.outcome, SyncOutcome::Applied);
        assert_eq!(report.diff.type_mismatch.len(), 1);
        assert!(report.diff.type_mismatch[0].contains("'age'"));
        assert!(report.added_columns.is_empty());
        assert!(executor.executed.is_empty());
    }

    #[tokio::test]
    async fn test_pk_mismatch_takes_no_action() {
        let table = live(
            &[("id", "uuid"), ("name", "text"), ("email", "text"), ("age", "int")],
            &["name"],
        );
        let mut executor = MockExecutor::new(Some(table));
        let report = sync_table(&mut executor, "app", &user_schema(), &SyncOptions::apply())
            .await
            .unwrap();

        assert_eq!(report.diff.pk_mismatch.len(), 1);
        assert!(executor.executed.is_empty());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: SyncOptions = serde_json::from_str(r#"{"auto_apply": true}"#).unwrap();
        assert!(options.auto_apply);
        assert!(options.verbose);
    }
}
