use crate::{
    domain::{
        Board, Column, ColumnId, CreateColumn, CreateProject, CreateTask, DeleteColumn,
        DeleteColumnAndReorderTasks, DeleteColumnAndTasks, DeleteTask, MoveTaskToColumn,
        OrderTask, Project, ProjectId, RenameColumn, ReorderColumn, Task, TaskId, UpdateTask,
    },
    error::{KanbanError, Result},
    storage::Storage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info};

/// Everything the file backend stores
#[derive(Debug, Default, Serialize, Deserialize)]
struct Workspace {
    boards: Vec<Board>,
}

impl Workspace {
    fn board(&self, project_id: &ProjectId) -> Result<&Board> {
        self.boards
            .iter()
            .find(|board| board.id() == project_id)
            .ok_or_else(|| KanbanError::ProjectNotFound(project_id.to_string()))
    }

    fn board_mut(&mut self, project_id: &ProjectId) -> Result<&mut Board> {
        self.boards
            .iter_mut()
            .find(|board| board.id() == project_id)
            .ok_or_else(|| KanbanError::ProjectNotFound(project_id.to_string()))
    }

    fn project_of_column(&self, column_id: &ColumnId) -> Result<ProjectId> {
        self.boards
            .iter()
            .find(|board| board.column(column_id).is_some())
            .map(|board| *board.id())
            .ok_or_else(|| KanbanError::ColumnNotFound(column_id.to_string()))
    }

    fn project_of_task(&self, task_id: &TaskId) -> Result<ProjectId> {
        self.boards
            .iter()
            .find(|board| board.locate_task(task_id).is_some())
            .map(|board| *board.id())
            .ok_or_else(|| KanbanError::TaskNotFound(task_id.to_string()))
    }

    fn board_with_column(&mut self, column_id: &ColumnId) -> Result<&mut Board> {
        let project_id = self.project_of_column(column_id)?;
        self.board_mut(&project_id)
    }

    fn board_with_task(&mut self, task_id: &TaskId) -> Result<&mut Board> {
        let project_id = self.project_of_task(task_id)?;
        self.board_mut(&project_id)
    }

    /// The board holding both columns; they must share a project
    fn board_with_columns(&mut self, first: &ColumnId, second: &ColumnId) -> Result<&mut Board> {
        let project_id = self.project_of_column(first)?;
        if self.project_of_column(second)? != project_id {
            return Err(KanbanError::ProjectMismatch {
                first: first.to_string(),
                second: second.to_string(),
            });
        }
        self.board_mut(&project_id)
    }
}

/// File-based storage implementation.
///
/// All boards live in a single JSON document. A mutation reads the document,
/// applies the change in memory and replaces the file with a rename, so a
/// failed mutation never leaves partial index changes on disk.
pub struct FileStorage {
    root_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    const KANBAN_DIR: &'static str = ".kanban";
    const BOARDS_FILE: &'static str = "boards.json";

    /// Creates a new FileStorage instance for the given project root
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: project_root.as_ref().join(Self::KANBAN_DIR),
            write_lock: Mutex::new(()),
        }
    }

    fn boards_file(&self) -> PathBuf {
        self.root_path.join(Self::BOARDS_FILE)
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    async fn read_workspace(&self) -> Result<Workspace> {
        let file_path = self.boards_file();
        if !file_path.exists() {
            return Err(KanbanError::NotInitialized);
        }

        let contents = fs::read_to_string(&file_path).await?;
        let mut workspace: Workspace = serde_json::from_str(&contents)?;
        for board in &mut workspace.boards {
            board.sort_by_index();
            board.check_density()?;
        }
        Ok(workspace)
    }

    async fn write_workspace(&self, workspace: &Workspace) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;

        let json = serde_json::to_string_pretty(workspace)?;
        let staging = self.root_path.join(format!("{}.tmp", Self::BOARDS_FILE));
        fs::write(&staging, json).await?;
        fs::rename(&staging, self.boards_file()).await?;
        Ok(())
    }

    /// Runs one mutation against the stored workspace. Writers are
    /// serialized; nothing is written if `apply` fails.
    async fn mutate<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Workspace) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut workspace = self.read_workspace().await?;
        let value = apply(&mut workspace)?;
        self.write_workspace(&workspace).await?;
        Ok(value)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn initialize(&self) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;

        if !self.boards_file().exists() {
            self.write_workspace(&Workspace::default()).await?;
        }

        let gitignore_path = self.root_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "# Local caches\n*.db\n*.db-*\n*.tmp\n").await?;
        }

        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.root_path.exists() && self.boards_file().exists()
    }

    async fn create_project(&self, req: &CreateProject) -> Result<Board> {
        req.validate()?;
        let board = self
            .mutate(|workspace| {
                let mut board = Board::new(Project::new(
                    req.name.trim().to_string(),
                    req.owner_id.trim().to_string(),
                ));
                for name in &req.columns {
                    board.push_column(name.trim().to_string());
                }
                workspace.boards.push(board.clone());
                Ok(board)
            })
            .await?;
        info!(project = %board.project.id, columns = board.columns.len(), "project created");
        Ok(board)
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>> {
        let workspace = self.read_workspace().await?;
        let mut projects: Vec<Project> = workspace
            .boards
            .into_iter()
            .filter(|board| board.project.is_owned_by(owner_id))
            .map(|board| board.project)
            .collect();
        projects.sort_by_key(|project| project.created_at);
        Ok(projects)
    }

    async fn load_board(&self, project_id: &ProjectId) -> Result<Board> {
        let workspace = self.read_workspace().await?;
        workspace.board(project_id).cloned()
    }

    async fn create_column(&self, req: &CreateColumn) -> Result<Column> {
        req.validate()?;
        self.mutate(|workspace| workspace.board_mut(&req.project_id)?.apply_create_column(req))
            .await
    }

    async fn rename_column(&self, req: &RenameColumn) -> Result<()> {
        req.validate()?;
        self.mutate(|workspace| {
            workspace
                .board_with_column(&req.column_id)?
                .apply_rename_column(req)
        })
        .await
    }

    async fn reorder_column(&self, req: &ReorderColumn) -> Result<()> {
        req.validate()?;
        self.mutate(|workspace| {
            workspace
                .board_with_columns(&req.source_column_id, &req.destination_column_id)?
                .apply_reorder_column(req)
        })
        .await
    }

    async fn delete_column(&self, req: &DeleteColumn) -> Result<()> {
        self.mutate(|workspace| {
            workspace
                .board_with_column(&req.column_id)?
                .apply_delete_column(req)
        })
        .await?;
        info!(column = %req.column_id, "column deleted");
        Ok(())
    }

    async fn delete_column_and_reorder_tasks(
        &self,
        req: &DeleteColumnAndReorderTasks,
    ) -> Result<usize> {
        req.validate()?;
        let moved = self
            .mutate(|workspace| {
                workspace
                    .board_with_columns(&req.column_id, &req.destination_column_id)?
                    .apply_delete_column_and_reorder_tasks(req)
            })
            .await?;
        info!(column = %req.column_id, destination = %req.destination_column_id, moved, "column deleted, tasks relocated");
        Ok(moved)
    }

    async fn delete_column_and_tasks(&self, req: &DeleteColumnAndTasks) -> Result<usize> {
        let deleted = self
            .mutate(|workspace| {
                workspace
                    .board_with_column(&req.column_id)?
                    .apply_delete_column_and_tasks(req)
            })
            .await?;
        info!(column = %req.column_id, deleted, "column deleted with its tasks");
        Ok(deleted)
    }

    async fn create_task(&self, req: &CreateTask) -> Result<Task> {
        req.validate()?;
        self.mutate(|workspace| {
            let board = workspace.board_with_column(&req.column_id)?;
            if board.id() != &req.project_id {
                return Err(KanbanError::ProjectMismatch {
                    first: req.project_id.to_string(),
                    second: board.id().to_string(),
                });
            }
            board.apply_create_task(req)
        })
        .await
    }

    async fn update_task(&self, req: &UpdateTask) -> Result<Task> {
        req.validate()?;
        self.mutate(|workspace| {
            workspace
                .board_with_task(&req.task_id)?
                .apply_update_task(req)
        })
        .await
    }

    async fn order_task(&self, req: &OrderTask) -> Result<()> {
        self.mutate(|workspace| {
            workspace
                .board_with_column(&req.column_id)?
                .apply_order_task(req)
        })
        .await
    }

    async fn move_task_to_column(&self, req: &MoveTaskToColumn) -> Result<()> {
        self.mutate(|workspace| {
            workspace
                .board_with_columns(&req.old_column_id, &req.new_column_id)?
                .apply_move_task_to_column(req)
        })
        .await
    }

    async fn delete_task(&self, req: &DeleteTask) -> Result<()> {
        let removed = self
            .mutate(|workspace| {
                workspace
                    .board_with_task(&req.task_id)?
                    .apply_delete_task(req)
            })
            .await?;
        debug!(task = %removed.id, column = %removed.column_id, "task deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn storage_with_board(layout: &[(&str, usize)]) -> (TempDir, FileStorage, Board) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.initialize().await.unwrap();

        let board = storage
            .create_project(&CreateProject {
                name: "Test".to_string(),
                owner_id: "owner".to_string(),
                columns: layout.iter().map(|(name, _)| name.to_string()).collect(),
            })
            .await
            .unwrap();
        for (position, (name, tasks)) in layout.iter().enumerate() {
            for n in 0..*tasks {
                storage
                    .create_task(&CreateTask::new(
                        board.project.id,
                        board.columns[position].id,
                        format!("{}-{}", name, n),
                    ))
                    .await
                    .unwrap();
            }
        }
        let board = storage.load_board(&board.project.id).await.unwrap();
        (temp_dir, storage, board)
    }

    fn titles(board: &Board, column: usize) -> Vec<String> {
        board.columns[column]
            .tasks
            .iter()
            .map(|task| task.title.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_storage_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        assert!(!storage.is_initialized().await);
        assert!(matches!(
            storage.list_projects("anyone").await,
            Err(KanbanError::NotInitialized)
        ));

        storage.initialize().await.unwrap();

        assert!(storage.is_initialized().await);
        assert!(storage.boards_file().exists());
        assert!(storage.list_projects("anyone").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_projects_are_scoped_to_owner() {
        let (_dir, storage, board) = storage_with_board(&[("A", 0)]).await;
        storage
            .create_project(&CreateProject {
                name: "Other".to_string(),
                owner_id: "someone-else".to_string(),
                columns: Vec::new(),
            })
            .await
            .unwrap();

        let mine = storage.list_projects("owner").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, board.project.id);
    }

    #[tokio::test]
    async fn test_create_task_appends() {
        let (_dir, storage, board) = storage_with_board(&[("A", 2)]).await;
        let task = storage
            .create_task(&CreateTask::new(board.project.id, board.columns[0].id, "late"))
            .await
            .unwrap();
        assert_eq!(task.index, 2);
    }

    #[tokio::test]
    async fn test_order_task_persists() {
        let (_dir, storage, board) = storage_with_board(&[("A", 4)]).await;
        storage
            .order_task(&OrderTask {
                column_id: board.columns[0].id,
                source_task_id: board.columns[0].tasks[0].id,
                source_index: 0,
                destination_index: 2,
            })
            .await
            .unwrap();

        let board = storage.load_board(&board.project.id).await.unwrap();
        assert_eq!(titles(&board, 0), vec!["A-1", "A-2", "A-0", "A-3"]);
    }

    #[tokio::test]
    async fn test_move_task_to_column_persists() {
        let (_dir, storage, board) = storage_with_board(&[("A", 3), ("B", 2)]).await;
        storage
            .move_task_to_column(&MoveTaskToColumn {
                task_id: board.columns[0].tasks[1].id,
                old_column_id: board.columns[0].id,
                new_column_id: board.columns[1].id,
                old_index: 1,
                new_index: 1,
            })
            .await
            .unwrap();

        let board = storage.load_board(&board.project.id).await.unwrap();
        assert_eq!(titles(&board, 0), vec!["A-0", "A-2"]);
        assert_eq!(titles(&board, 1), vec!["B-0", "A-1", "B-1"]);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_file_untouched() {
        let (_dir, storage, board) = storage_with_board(&[("A", 3), ("B", 2)]).await;
        let before = fs::read_to_string(storage.boards_file()).await.unwrap();

        let err = storage
            .move_task_to_column(&MoveTaskToColumn {
                task_id: board.columns[0].tasks[1].id,
                old_column_id: board.columns[0].id,
                new_column_id: board.columns[1].id,
                old_index: 1,
                new_index: 7,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KanbanError::IndexOutOfRange { .. }));

        let after = fs::read_to_string(storage.boards_file()).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_move_across_projects_is_rejected() {
        let (_dir, storage, board) = storage_with_board(&[("A", 1)]).await;
        let other = storage
            .create_project(&CreateProject {
                name: "Other".to_string(),
                owner_id: "owner".to_string(),
                columns: vec!["X".to_string()],
            })
            .await
            .unwrap();

        let err = storage
            .move_task_to_column(&MoveTaskToColumn {
                task_id: board.columns[0].tasks[0].id,
                old_column_id: board.columns[0].id,
                new_column_id: other.columns[0].id,
                old_index: 0,
                new_index: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KanbanError::ProjectMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete_column_and_reorder_tasks() {
        let (_dir, storage, board) = storage_with_board(&[("A", 2), ("B", 1)]).await;
        let moved = storage
            .delete_column_and_reorder_tasks(&DeleteColumnAndReorderTasks {
                column_id: board.columns[0].id,
                destination_column_id: board.columns[1].id,
            })
            .await
            .unwrap();
        assert_eq!(moved, 2);

        let board = storage.load_board(&board.project.id).await.unwrap();
        assert_eq!(board.columns.len(), 1);
        assert_eq!(board.columns[0].index, 0);
        assert_eq!(titles(&board, 0), vec!["B-0", "A-0", "A-1"]);
    }

    #[tokio::test]
    async fn test_delete_task_closes_gap() {
        let (_dir, storage, board) = storage_with_board(&[("A", 3)]).await;
        storage
            .delete_task(&DeleteTask {
                task_id: board.columns[0].tasks[0].id,
            })
            .await
            .unwrap();

        let board = storage.load_board(&board.project.id).await.unwrap();
        assert_eq!(titles(&board, 0), vec!["A-1", "A-2"]);
        board.check_density().unwrap();
    }

    #[tokio::test]
    async fn test_version_increments_per_mutation() {
        let (_dir, storage, board) = storage_with_board(&[("A", 2)]).await;
        assert_eq!(board.version, 2);

        storage
            .rename_column(&RenameColumn {
                column_id: board.columns[0].id,
                name: "Renamed".to_string(),
            })
            .await
            .unwrap();
        let board = storage.load_board(&board.project.id).await.unwrap();
        assert_eq!(board.version, 3);
        assert_eq!(board.columns[0].name, "Renamed");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_detected() {
        let (_dir, storage, board) = storage_with_board(&[("A", 2)]).await;
        let mut workspace = storage.read_workspace().await.unwrap();
        workspace.boards[0].columns[0].tasks[1].index = 4;
        storage.write_workspace(&workspace).await.unwrap();

        assert!(matches!(
            storage.load_board(&board.project.id).await,
            Err(KanbanError::Corrupt(_))
        ));
    }
}
