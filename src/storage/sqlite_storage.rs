use crate::{
    domain::{
        mutation::{clean_description, clean_name, expect_in_range, expect_index},
        Board, Column, ColumnId, CreateColumn, CreateProject, CreateTask, DeleteColumn,
        DeleteColumnAndReorderTasks, DeleteColumnAndTasks, DeleteTask, MoveTaskToColumn,
        OrderTask, Priority, Project, ProjectId, RenameColumn, ReorderColumn, Shift, Task,
        TaskId, UpdateTask,
    },
    error::{KanbanError, Result},
    storage::Storage,
};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{
    params, types::Type, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::{collections::HashMap, path::Path, str::FromStr, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    owner_id    TEXT NOT NULL,
    version     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS board_columns (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    idx         INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS board_columns_project_idx ON board_columns(project_id, idx);

CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    column_id   TEXT NOT NULL REFERENCES board_columns(id),
    title       TEXT NOT NULL,
    description TEXT,
    priority    TEXT NOT NULL DEFAULT 'medium',
    idx         INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS tasks_column_idx ON tasks(column_id, idx);
"#;

const TASK_COLUMNS: &str =
    "id, project_id, column_id, title, description, priority, idx, created_at, updated_at";

/// SQLite-based storage backend.
///
/// Every mutation runs in one transaction: sibling renumbering and the moved
/// row's own update commit together or not at all. Concurrent mutations are
/// serialized on the connection.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Copy)]
struct TaskPlacement {
    project_id: ProjectId,
    column_id: ColumnId,
    index: usize,
}

#[derive(Debug, Clone, Copy)]
struct ColumnPlacement {
    project_id: ProjectId,
    index: usize,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database at `database_path`
    pub fn open(database_path: impl AsRef<Path>) -> Result<Self> {
        let database_path = database_path.as_ref();
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::configure(Connection::open(database_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `apply` inside a transaction. Returning an error drops the
    /// transaction, which rolls back every statement it executed. The write
    /// lock is taken at `BEGIN` so another connection to the same file waits
    /// on the busy timeout instead of failing mid-transaction.
    async fn transact<T, F>(&self, op: &'static str, apply: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send,
        T: Send,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = apply(&tx)?;
        tx.commit()?;
        debug!(op, "transaction committed");
        Ok(value)
    }

    async fn read<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send,
        T: Send,
    {
        let conn = self.conn.lock().await;
        query(&conn)
    }
}

fn idx(value: usize) -> i64 {
    value as i64
}

fn parse_column<T>(row: &Row<'_>, column: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = KanbanError>,
{
    let raw: String = row.get(column)?;
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

fn read_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_column(row, 0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn read_column(row: &Row<'_>) -> rusqlite::Result<Column> {
    Ok(Column {
        id: parse_column(row, 0)?,
        project_id: parse_column(row, 1)?,
        name: row.get(2)?,
        index: row.get::<_, i64>(3)? as usize,
        created_at: row.get(4)?,
        tasks: Vec::new(),
    })
}

fn read_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_column(row, 0)?,
        project_id: parse_column(row, 1)?,
        column_id: parse_column(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        priority: parse_column::<Priority>(row, 5)?,
        index: row.get::<_, i64>(6)? as usize,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn task_placement(conn: &Connection, task_id: &TaskId) -> Result<TaskPlacement> {
    conn.query_row(
        "SELECT project_id, column_id, idx FROM tasks WHERE id = ?1",
        params![task_id.to_string()],
        |row| {
            Ok(TaskPlacement {
                project_id: parse_column(row, 0)?,
                column_id: parse_column(row, 1)?,
                index: row.get::<_, i64>(2)? as usize,
            })
        },
    )
    .optional()?
    .ok_or_else(|| KanbanError::TaskNotFound(task_id.to_string()))
}

fn column_placement(conn: &Connection, column_id: &ColumnId) -> Result<ColumnPlacement> {
    conn.query_row(
        "SELECT project_id, idx FROM board_columns WHERE id = ?1",
        params![column_id.to_string()],
        |row| {
            Ok(ColumnPlacement {
                project_id: parse_column(row, 0)?,
                index: row.get::<_, i64>(1)? as usize,
            })
        },
    )
    .optional()?
    .ok_or_else(|| KanbanError::ColumnNotFound(column_id.to_string()))
}

fn task_count(conn: &Connection, column_id: &ColumnId) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE column_id = ?1",
        params![column_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn column_count(conn: &Connection, project_id: &ProjectId) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM board_columns WHERE project_id = ?1",
        params![project_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn ensure_project(conn: &Connection, project_id: &ProjectId) -> Result<()> {
    let found = conn
        .query_row(
            "SELECT 1 FROM projects WHERE id = ?1",
            params![project_id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    found.ok_or_else(|| KanbanError::ProjectNotFound(project_id.to_string()))
}

fn ensure_same_project(
    first: &ColumnId,
    first_project: &ProjectId,
    second: &ColumnId,
    second_project: &ProjectId,
) -> Result<()> {
    if first_project != second_project {
        return Err(KanbanError::ProjectMismatch {
            first: first.to_string(),
            second: second.to_string(),
        });
    }
    Ok(())
}

fn bump_version(conn: &Connection, project_id: &ProjectId) -> Result<u64> {
    conn.execute(
        "UPDATE projects SET version = version + 1 WHERE id = ?1",
        params![project_id.to_string()],
    )?;
    let version: i64 = conn.query_row(
        "SELECT version FROM projects WHERE id = ?1",
        params![project_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(version as u64)
}

fn insert_column(conn: &Connection, column: &Column) -> Result<()> {
    conn.execute(
        "INSERT INTO board_columns (id, project_id, name, idx, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            column.id.to_string(),
            column.project_id.to_string(),
            column.name,
            idx(column.index),
            column.created_at
        ],
    )?;
    Ok(())
}

/// Deletes a column row and closes the gap among its siblings
fn remove_column_row(conn: &Connection, column_id: &ColumnId, placement: ColumnPlacement) -> Result<()> {
    conn.execute(
        "DELETE FROM board_columns WHERE id = ?1",
        params![column_id.to_string()],
    )?;
    conn.execute(
        "UPDATE board_columns SET idx = idx - 1 WHERE project_id = ?1 AND idx > ?2",
        params![placement.project_id.to_string(), idx(placement.index)],
    )?;
    Ok(())
}

fn load_task(conn: &Connection, task_id: &TaskId) -> Result<Task> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
        params![task_id.to_string()],
        read_task,
    )
    .optional()?
    .ok_or_else(|| KanbanError::TaskNotFound(task_id.to_string()))
}

fn order_task_tx(conn: &Connection, req: &OrderTask) -> Result<ProjectId> {
    column_placement(conn, &req.column_id)?;
    let placement = task_placement(conn, &req.source_task_id)?;
    if placement.column_id != req.column_id {
        return Err(KanbanError::TaskNotInColumn {
            task: req.source_task_id.to_string(),
            column: req.column_id.to_string(),
        });
    }
    expect_index(req.source_task_id, req.source_index, placement.index)?;
    let count = task_count(conn, &req.column_id)?;
    expect_in_range(req.destination_index, count.saturating_sub(1))?;

    if let Some(shift) = Shift::between(placement.index, req.destination_index) {
        conn.execute(
            "UPDATE tasks SET idx = idx + ?1
             WHERE column_id = ?2 AND idx BETWEEN ?3 AND ?4 AND id != ?5",
            params![
                shift.delta,
                req.column_id.to_string(),
                idx(shift.low()),
                idx(shift.high()),
                req.source_task_id.to_string()
            ],
        )?;
        let updated = conn.execute(
            "UPDATE tasks SET idx = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                idx(req.destination_index),
                Utc::now(),
                req.source_task_id.to_string()
            ],
        )?;
        if updated != 1 {
            return Err(KanbanError::TaskNotFound(req.source_task_id.to_string()));
        }
    }
    Ok(placement.project_id)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn initialize(&self) -> Result<()> {
        self.transact("initialize", |tx| {
            tx.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    async fn is_initialized(&self) -> bool {
        self.read(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tasks'",
                    [],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
        .unwrap_or(false)
    }

    async fn create_project(&self, req: &CreateProject) -> Result<Board> {
        req.validate()?;
        let project = Project::new(req.name.trim().to_string(), req.owner_id.trim().to_string());
        let board = self
            .transact("create_project", move |tx| {
                tx.execute(
                    "INSERT INTO projects (id, name, owner_id, version, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
                    params![
                        project.id.to_string(),
                        project.name,
                        project.owner_id,
                        project.created_at
                    ],
                )?;
                let mut board = Board::new(project);
                for name in &req.columns {
                    let column = board.push_column(name.trim().to_string());
                    insert_column(tx, column)?;
                }
                Ok(board)
            })
            .await?;
        info!(project = %board.project.id, columns = board.columns.len(), "project created");
        Ok(board)
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, owner_id, created_at FROM projects
                 WHERE owner_id = ?1 ORDER BY created_at, rowid",
            )?;
            let projects = stmt
                .query_map(params![owner_id], read_project)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(projects)
        })
        .await
    }

    async fn load_board(&self, project_id: &ProjectId) -> Result<Board> {
        self.read(|conn| {
            let (project, version) = conn
                .query_row(
                    "SELECT id, name, owner_id, created_at, version FROM projects WHERE id = ?1",
                    params![project_id.to_string()],
                    |row| Ok((read_project(row)?, row.get::<_, i64>(4)?)),
                )
                .optional()?
                .ok_or_else(|| KanbanError::ProjectNotFound(project_id.to_string()))?;

            let mut board = Board::new(project);
            board.version = version as u64;

            let mut stmt = conn.prepare(
                "SELECT id, project_id, name, idx, created_at FROM board_columns
                 WHERE project_id = ?1 ORDER BY idx",
            )?;
            board.columns = stmt
                .query_map(params![project_id.to_string()], read_column)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let positions: HashMap<ColumnId, usize> = board
                .columns
                .iter()
                .enumerate()
                .map(|(position, column)| (column.id, position))
                .collect();

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY idx",
                TASK_COLUMNS
            ))?;
            let tasks = stmt.query_map(params![project_id.to_string()], read_task)?;
            for task in tasks {
                let task = task?;
                let position = positions.get(&task.column_id).copied().ok_or_else(|| {
                    KanbanError::Corrupt(format!(
                        "task {} points at missing column {}",
                        task.id, task.column_id
                    ))
                })?;
                board.columns[position].tasks.push(task);
            }

            board.sort_by_index();
            board.check_density()?;
            Ok(board)
        })
        .await
    }

    async fn create_column(&self, req: &CreateColumn) -> Result<Column> {
        let name = clean_name("column name", &req.name)?;
        let column = self
            .transact("create_column", move |tx| {
                ensure_project(tx, &req.project_id)?;
                let count = column_count(tx, &req.project_id)?;
                if let Some(hint) = req.position_hint {
                    if hint != count {
                        debug!(hint, actual = count, "column position hint ignored");
                    }
                }
                let column = Column::new(req.project_id, name, count);
                insert_column(tx, &column)?;
                bump_version(tx, &req.project_id)?;
                Ok(column)
            })
            .await?;
        info!(column = %column.id, index = column.index, "column created");
        Ok(column)
    }

    async fn rename_column(&self, req: &RenameColumn) -> Result<()> {
        let name = clean_name("column name", &req.name)?;
        self.transact("rename_column", move |tx| {
            let placement = column_placement(tx, &req.column_id)?;
            tx.execute(
                "UPDATE board_columns SET name = ?1 WHERE id = ?2",
                params![name, req.column_id.to_string()],
            )?;
            bump_version(tx, &placement.project_id)?;
            Ok(())
        })
        .await
    }

    async fn reorder_column(&self, req: &ReorderColumn) -> Result<()> {
        req.validate()?;
        self.transact("reorder_column", |tx| {
            let source = column_placement(tx, &req.source_column_id)?;
            let destination = column_placement(tx, &req.destination_column_id)?;
            ensure_same_project(
                &req.source_column_id,
                &source.project_id,
                &req.destination_column_id,
                &destination.project_id,
            )?;
            expect_index(req.source_column_id, req.source_index, source.index)?;
            expect_index(
                req.destination_column_id,
                req.destination_index,
                destination.index,
            )?;

            if let Some(shift) = Shift::between(source.index, destination.index) {
                tx.execute(
                    "UPDATE board_columns SET idx = idx + ?1
                     WHERE project_id = ?2 AND idx BETWEEN ?3 AND ?4 AND id != ?5",
                    params![
                        shift.delta,
                        source.project_id.to_string(),
                        idx(shift.low()),
                        idx(shift.high()),
                        req.source_column_id.to_string()
                    ],
                )?;
                tx.execute(
                    "UPDATE board_columns SET idx = ?1 WHERE id = ?2",
                    params![idx(destination.index), req.source_column_id.to_string()],
                )?;
            }
            bump_version(tx, &source.project_id)?;
            Ok(())
        })
        .await
    }

    async fn delete_column(&self, req: &DeleteColumn) -> Result<()> {
        self.transact("delete_column", |tx| {
            let placement = column_placement(tx, &req.column_id)?;
            let tasks = task_count(tx, &req.column_id)?;
            if tasks > 0 {
                return Err(KanbanError::ColumnNotEmpty {
                    column: req.column_id.to_string(),
                    tasks,
                });
            }
            remove_column_row(tx, &req.column_id, placement)?;
            bump_version(tx, &placement.project_id)?;
            Ok(())
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
            .transact("delete_column_and_reorder_tasks", |tx| {
                let source = column_placement(tx, &req.column_id)?;
                let destination = column_placement(tx, &req.destination_column_id)?;
                ensure_same_project(
                    &req.column_id,
                    &source.project_id,
                    &req.destination_column_id,
                    &destination.project_id,
                )?;

                let base = task_count(tx, &req.destination_column_id)?;
                let moved = tx.execute(
                    "UPDATE tasks SET column_id = ?1, idx = idx + ?2, updated_at = ?3
                     WHERE column_id = ?4",
                    params![
                        req.destination_column_id.to_string(),
                        idx(base),
                        Utc::now(),
                        req.column_id.to_string()
                    ],
                )?;
                remove_column_row(tx, &req.column_id, source)?;
                bump_version(tx, &source.project_id)?;
                Ok(moved)
            })
            .await?;
        info!(column = %req.column_id, destination = %req.destination_column_id, moved, "column deleted, tasks relocated");
        Ok(moved)
    }

    async fn delete_column_and_tasks(&self, req: &DeleteColumnAndTasks) -> Result<usize> {
        let deleted = self
            .transact("delete_column_and_tasks", |tx| {
                let placement = column_placement(tx, &req.column_id)?;
                let deleted = tx.execute(
                    "DELETE FROM tasks WHERE column_id = ?1",
                    params![req.column_id.to_string()],
                )?;
                remove_column_row(tx, &req.column_id, placement)?;
                bump_version(tx, &placement.project_id)?;
                Ok(deleted)
            })
            .await?;
        info!(column = %req.column_id, deleted, "column deleted with its tasks");
        Ok(deleted)
    }

    async fn create_task(&self, req: &CreateTask) -> Result<Task> {
        let title = clean_name("task title", &req.title)?;
        self.transact("create_task", move |tx| {
            let column = column_placement(tx, &req.column_id)?;
            if column.project_id != req.project_id {
                return Err(KanbanError::ProjectMismatch {
                    first: req.project_id.to_string(),
                    second: column.project_id.to_string(),
                });
            }
            let count = task_count(tx, &req.column_id)?;
            if let Some(hint) = req.index {
                if hint != count {
                    debug!(hint, actual = count, "task index hint ignored");
                }
            }

            let mut task = Task::new(req.project_id, req.column_id, title, count);
            task.description = clean_description(req.description.as_deref());
            task.priority = req.priority.unwrap_or_default();
            tx.execute(
                &format!(
                    "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    TASK_COLUMNS
                ),
                params![
                    task.id.to_string(),
                    task.project_id.to_string(),
                    task.column_id.to_string(),
                    task.title,
                    task.description,
                    task.priority.as_str(),
                    idx(task.index),
                    task.created_at,
                    task.updated_at
                ],
            )?;
            bump_version(tx, &task.project_id)?;
            Ok(task)
        })
        .await
    }

    async fn update_task(&self, req: &UpdateTask) -> Result<Task> {
        req.validate()?;
        self.transact("update_task", |tx| {
            let mut task = load_task(tx, &req.task_id)?;
            if let Some(title) = &req.title {
                task.set_title(clean_name("task title", title)?);
            }
            if let Some(description) = &req.description {
                task.set_description(clean_description(Some(description)));
            }
            if let Some(priority) = req.priority {
                task.set_priority(priority);
            }
            tx.execute(
                "UPDATE tasks SET title = ?1, description = ?2, priority = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    task.title,
                    task.description,
                    task.priority.as_str(),
                    task.updated_at,
                    task.id.to_string()
                ],
            )?;
            bump_version(tx, &task.project_id)?;
            Ok(task)
        })
        .await
    }

    async fn order_task(&self, req: &OrderTask) -> Result<()> {
        self.transact("order_task", |tx| {
            let project_id = order_task_tx(tx, req)?;
            bump_version(tx, &project_id)?;
            Ok(())
        })
        .await
    }

    async fn move_task_to_column(&self, req: &MoveTaskToColumn) -> Result<()> {
        if let Some(reorder) = req.as_reorder() {
            return self.order_task(&reorder).await;
        }

        self.transact("move_task_to_column", |tx| {
            let placement = task_placement(tx, &req.task_id)?;
            if placement.column_id != req.old_column_id {
                return Err(KanbanError::TaskNotInColumn {
                    task: req.task_id.to_string(),
                    column: req.old_column_id.to_string(),
                });
            }
            expect_index(req.task_id, req.old_index, placement.index)?;
            let target = column_placement(tx, &req.new_column_id)?;
            ensure_same_project(
                &req.old_column_id,
                &placement.project_id,
                &req.new_column_id,
                &target.project_id,
            )?;
            expect_in_range(req.new_index, task_count(tx, &req.new_column_id)?)?;

            // close the gap in the old column
            tx.execute(
                "UPDATE tasks SET idx = idx - 1 WHERE column_id = ?1 AND idx > ?2",
                params![req.old_column_id.to_string(), idx(placement.index)],
            )?;
            // open a slot in the new one
            tx.execute(
                "UPDATE tasks SET idx = idx + 1 WHERE column_id = ?1 AND idx >= ?2",
                params![req.new_column_id.to_string(), idx(req.new_index)],
            )?;
            let updated = tx.execute(
                "UPDATE tasks SET column_id = ?1, idx = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    req.new_column_id.to_string(),
                    idx(req.new_index),
                    Utc::now(),
                    req.task_id.to_string()
                ],
            )?;
            if updated != 1 {
                return Err(KanbanError::TaskNotFound(req.task_id.to_string()));
            }
            bump_version(tx, &placement.project_id)?;
            Ok(())
        })
        .await
    }

    async fn delete_task(&self, req: &DeleteTask) -> Result<()> {
        self.transact("delete_task", |tx| {
            let placement = task_placement(tx, &req.task_id)?;
            tx.execute(
                "DELETE FROM tasks WHERE id = ?1",
                params![req.task_id.to_string()],
            )?;
            tx.execute(
                "UPDATE tasks SET idx = idx - 1 WHERE column_id = ?1 AND idx > ?2",
                params![placement.column_id.to_string(), idx(placement.index)],
            )?;
            bump_version(tx, &placement.project_id)?;
            Ok(())
        })
        .await
    }
}
