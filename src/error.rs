use thiserror::Error;

pub type Result<T> = std::result::Result<T, KanbanError>;

#[derive(Debug, Error)]
pub enum KanbanError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {task} does not belong to column {column}")]
    TaskNotInColumn { task: String, column: String },

    #[error("Columns {first} and {second} belong to different projects")]
    ProjectMismatch { first: String, second: String },

    #[error("Stale index for {entity}: request says {expected}, stored is {actual}")]
    StaleIndex {
        entity: String,
        expected: usize,
        actual: usize,
    },

    #[error("Index {index} out of range (0..={max})")]
    IndexOutOfRange { index: usize, max: usize },

    #[error("Column {column} still holds {tasks} task(s)")]
    ColumnNotEmpty { column: String, tasks: usize },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Index invariant violated: {0}")]
    Corrupt(String),

    #[error("Storage not initialized")]
    NotInitialized,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[cfg(feature = "sqlite-storage")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] toml::de::Error),
}

impl KanbanError {
    /// True when the request was built from a board view that no longer
    /// matches stored state; the caller should refetch and retry the gesture.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleIndex { .. })
    }
}
