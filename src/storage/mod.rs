use crate::{
    config::{Backend, Config},
    domain::{
        Board, Column, Commit, CreateColumn, CreateProject, CreateTask, DeleteColumn,
        DeleteColumnAndReorderTasks, DeleteColumnAndTasks, DeleteTask, MoveTaskToColumn,
        OrderTask, Project, ProjectId, RenameColumn, ReorderColumn, Task, UpdateTask,
    },
    error::Result,
};
use async_trait::async_trait;

pub mod file_storage;

#[cfg(feature = "sqlite-storage")]
pub mod sqlite_storage;

pub use file_storage::FileStorage;
#[cfg(feature = "sqlite-storage")]
pub use sqlite_storage::SqliteStorage;

/// Authoritative board storage.
///
/// Every mutation is atomic: it either applies all of its index changes and
/// bumps the project's version, or leaves the stored board untouched.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initializes the storage backend
    async fn initialize(&self) -> Result<()>;

    /// Checks if the storage has been initialized
    async fn is_initialized(&self) -> bool;

    /// Creates a project and its initial columns
    async fn create_project(&self, req: &CreateProject) -> Result<Board>;

    /// Lists the projects owned by a user, oldest first
    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>>;

    /// Loads a project's board with columns and tasks in index order
    async fn load_board(&self, project_id: &ProjectId) -> Result<Board>;

    /// Appends a column at the end of the board
    async fn create_column(&self, req: &CreateColumn) -> Result<Column>;

    async fn rename_column(&self, req: &RenameColumn) -> Result<()>;

    /// Moves a column to another position, shifting the columns in between
    async fn reorder_column(&self, req: &ReorderColumn) -> Result<()>;

    /// Deletes a column that holds no tasks
    async fn delete_column(&self, req: &DeleteColumn) -> Result<()>;

    /// Appends all of a column's tasks to another column, then deletes it.
    /// Returns the number of relocated tasks.
    async fn delete_column_and_reorder_tasks(&self, req: &DeleteColumnAndReorderTasks)
        -> Result<usize>;

    /// Deletes a column together with its tasks. Returns the number of
    /// deleted tasks.
    async fn delete_column_and_tasks(&self, req: &DeleteColumnAndTasks) -> Result<usize>;

    /// Appends a task at the end of a column
    async fn create_task(&self, req: &CreateTask) -> Result<Task>;

    /// Edits a task's title, description or priority
    async fn update_task(&self, req: &UpdateTask) -> Result<Task>;

    /// Moves a task within its column
    async fn order_task(&self, req: &OrderTask) -> Result<()>;

    /// Moves a task into another column at the given position
    async fn move_task_to_column(&self, req: &MoveTaskToColumn) -> Result<()>;

    /// Deletes a task and closes the gap it leaves in its column
    async fn delete_task(&self, req: &DeleteTask) -> Result<()>;

    /// Persists the outcome of a drag gesture
    async fn apply_commit(&self, commit: &Commit) -> Result<()> {
        match commit {
            Commit::OrderTask(req) => self.order_task(req).await,
            Commit::MoveTaskToColumn(req) => self.move_task_to_column(req).await,
            Commit::ReorderColumn(req) => self.reorder_column(req).await,
        }
    }
}

/// Opens and initializes the backend named by the configuration
pub async fn open_storage(config: &Config) -> Result<Box<dyn Storage>> {
    let storage: Box<dyn Storage> = match config.storage.backend {
        Backend::File => Box::new(FileStorage::new(&config.storage.path)),
        #[cfg(feature = "sqlite-storage")]
        Backend::Sqlite => Box::new(SqliteStorage::open(&config.storage.path)?),
        #[cfg(not(feature = "sqlite-storage"))]
        Backend::Sqlite => {
            return Err(crate::error::KanbanError::StorageError(
                "built without the sqlite-storage feature".to_string(),
            ))
        }
    };
    storage.initialize().await?;
    tracing::info!(backend = ?config.storage.backend, "storage ready");
    Ok(storage)
}

/// Fills in configured default columns for a request that names none
pub fn with_default_columns(config: &Config, req: &CreateProject) -> CreateProject {
    let mut req = req.clone();
    if req.columns.is_empty() {
        req.columns = config.board.default_columns.clone();
    }
    req
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DragBoard;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_file_backend() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_toml_str(&format!(
            "[storage]\nbackend = \"file\"\npath = {:?}\n",
            temp_dir.path().to_string_lossy()
        ))
        .unwrap();

        let storage = open_storage(&config).await.unwrap();
        assert!(storage.is_initialized().await);
    }

    #[cfg(feature = "sqlite-storage")]
    #[tokio::test]
    async fn test_open_sqlite_backend_seeds_default_columns() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.backend = Backend::Sqlite;
        config.storage.path = temp_dir.path().join("board.db");

        let storage = open_storage(&config).await.unwrap();
        let req = with_default_columns(
            &config,
            &CreateProject {
                name: "Launch".to_string(),
                owner_id: "user-1".to_string(),
                columns: Vec::new(),
            },
        );
        let board = storage.create_project(&req).await.unwrap();

        let names: Vec<_> = board.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Todo", "In Progress", "Done"]);
    }

    #[tokio::test]
    async fn test_drag_gesture_round_trip_through_storage() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.initialize().await.unwrap();

        let board = storage
            .create_project(&CreateProject {
                name: "P".to_string(),
                owner_id: "u".to_string(),
                columns: vec!["A".to_string(), "B".to_string()],
            })
            .await
            .unwrap();
        for title in ["one", "two"] {
            storage
                .create_task(&CreateTask::new(board.project.id, board.columns[0].id, title))
                .await
                .unwrap();
        }

        let mut drag = DragBoard::new(storage.load_board(&board.project.id).await.unwrap());
        let active = crate::domain::DragId::Task(drag.board().columns[0].tasks[0].id);
        let over = crate::domain::DragId::Column(drag.board().columns[1].id);
        drag.drag_start(active);
        drag.drag_over(active, over);
        let commit = drag.drag_end(active, Some(over)).unwrap();

        storage.apply_commit(&commit).await.unwrap();
        let fresh = storage.load_board(&board.project.id).await.unwrap();
        assert!(drag.apply_snapshot(fresh));

        let b: Vec<_> = drag.board().columns[1].tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(b, vec!["one"]);
        assert_eq!(drag.board().columns[0].tasks[0].index, 0);
    }
}
