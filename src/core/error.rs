use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Row '{1}' not found in table '{0}'")]
    RowNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("History write failed: {0}")]
    HistoryWrite(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
