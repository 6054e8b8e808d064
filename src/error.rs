use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapperError>;

#[derive(Debug, Error)]
pub enum MapperError {
    /// Invalid model or field declaration, raised while the schema is built
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conversion error for field '{field}': {message}")]
    Conversion { field: String, message: String },

    #[error("Unsupported filter operator '{operator}'. Valid operators: {valid}")]
    UnsupportedOperator { operator: String, valid: String },

    #[error("Invalid value for filter '{filter}': {message}")]
    InvalidFilterValue { filter: String, message: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Statement failed: {statement} (params: {params}): {source}")]
    Execution {
        statement: String,
        params: String,
        #[source]
        source: Box<MapperError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl MapperError {
    pub fn conversion(field: impl Into<String>, message: impl Into<String>) -> Self {
        MapperError::Conversion {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        MapperError::InvalidFilterValue {
            filter: filter.into(),
            message: message.into(),
        }
    }

    /// Attach the failing statement to an executor error
    pub fn execution(statement: &str, params: &[serde_json::Value], source: MapperError) -> Self {
        let params = serde_json::to_string(params).unwrap_or_else(|_| format!("{:?}", params));
        MapperError::Execution {
            statement: statement.to_string(),
            params,
            source: Box::new(source),
        }
    }
}
