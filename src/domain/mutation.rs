//! Board mutation requests and their authoritative application.
//!
//! The request structs are the RPC payloads the UI sends. `Board::apply_*`
//! validates a request against the current board and performs the index
//! maintenance in memory; the SQL backend performs the same checks against
//! its rows so both backends reject and accept exactly the same requests.

use crate::{
    domain::{
        board::{Board, Column},
        ids::{ColumnId, ProjectId, TaskId},
        task::{Priority, Task},
    },
    error::{KanbanError, Result},
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{debug, warn};

/// Longest accepted project, column or task name
pub const MAX_NAME_LEN: usize = 200;

/// Trims a user supplied name and rejects empty or oversized values
pub fn clean_name(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(KanbanError::Validation(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(KanbanError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn clean_description(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Rejects a request whose view of an index no longer matches storage
pub(crate) fn expect_index(entity: impl Display, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        let entity = entity.to_string();
        warn!(%entity, expected, actual, "rejecting request built on stale index");
        return Err(KanbanError::StaleIndex {
            entity,
            expected,
            actual,
        });
    }
    Ok(())
}

pub(crate) fn expect_in_range(index: usize, max: usize) -> Result<()> {
    if index > max {
        return Err(KanbanError::IndexOutOfRange { index, max });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    pub name: String,
    pub owner_id: String,
    /// Columns to create, in order
    #[serde(default)]
    pub columns: Vec<String>,
}

impl CreateProject {
    pub fn validate(&self) -> Result<()> {
        clean_name("project name", &self.name)?;
        if self.owner_id.trim().is_empty() {
            return Err(KanbanError::Validation("owner id must not be empty".to_string()));
        }
        for column in &self.columns {
            clean_name("column name", column)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateColumn {
    pub name: String,
    pub project_id: ProjectId,
    /// The client's idea of the new column's position; the column is always
    /// appended at the authoritative end.
    #[serde(default)]
    pub position_hint: Option<usize>,
}

impl CreateColumn {
    pub fn validate(&self) -> Result<()> {
        clean_name("column name", &self.name).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameColumn {
    pub column_id: ColumnId,
    pub name: String,
}

impl RenameColumn {
    pub fn validate(&self) -> Result<()> {
        clean_name("column name", &self.name).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderColumn {
    pub source_column_id: ColumnId,
    pub source_index: usize,
    /// The column currently sitting at `destination_index`
    pub destination_column_id: ColumnId,
    pub destination_index: usize,
}

impl ReorderColumn {
    pub fn validate(&self) -> Result<()> {
        if self.source_column_id == self.destination_column_id
            && self.source_index != self.destination_index
        {
            return Err(KanbanError::Validation(
                "same source and destination column with different indices".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteColumn {
    pub column_id: ColumnId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteColumnAndReorderTasks {
    pub column_id: ColumnId,
    pub destination_column_id: ColumnId,
}

impl DeleteColumnAndReorderTasks {
    pub fn validate(&self) -> Result<()> {
        if self.column_id == self.destination_column_id {
            return Err(KanbanError::Validation(
                "tasks cannot be relocated into the column being deleted".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteColumnAndTasks {
    pub column_id: ColumnId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    pub title: String,
    pub column_id: ColumnId,
    pub project_id: ProjectId,
    /// Client-side position hint; tasks are always appended
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl CreateTask {
    pub fn new(project_id: ProjectId, column_id: ColumnId, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            column_id,
            project_id,
            index: None,
            description: None,
            priority: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        clean_name("task title", &self.title).map(|_| ())
    }
}

/// Edits a task's content; never touches ordering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTask {
    pub task_id: TaskId,
    #[serde(default)]
    pub title: Option<String>,
    /// `Some("")` clears the description
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl UpdateTask {
    pub fn validate(&self) -> Result<()> {
        if self.title.is_none() && self.description.is_none() && self.priority.is_none() {
            return Err(KanbanError::Validation("nothing to update".to_string()));
        }
        if let Some(title) = &self.title {
            clean_name("task title", title)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTask {
    pub column_id: ColumnId,
    pub source_task_id: TaskId,
    pub source_index: usize,
    pub destination_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskToColumn {
    pub task_id: TaskId,
    pub old_column_id: ColumnId,
    pub new_column_id: ColumnId,
    pub old_index: usize,
    pub new_index: usize,
}

impl MoveTaskToColumn {
    /// A move that stays inside one column is a plain reorder
    pub fn as_reorder(&self) -> Option<OrderTask> {
        (self.old_column_id == self.new_column_id).then(|| OrderTask {
            column_id: self.old_column_id,
            source_task_id: self.task_id,
            source_index: self.old_index,
            destination_index: self.new_index,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTask {
    #[serde(alias = "taskKey")]
    pub task_id: TaskId,
}

impl Board {
    fn committed(&mut self, op: &str) {
        self.version += 1;
        debug!(project = %self.project.id, version = self.version, op, "board mutation applied");
    }

    fn require_column_index(&self, column_id: &ColumnId) -> Result<usize> {
        self.column_position(column_id)
            .ok_or_else(|| KanbanError::ColumnNotFound(column_id.to_string()))
    }

    pub fn apply_create_column(&mut self, req: &CreateColumn) -> Result<Column> {
        req.validate()?;
        if req.project_id != self.project.id {
            return Err(KanbanError::ProjectNotFound(req.project_id.to_string()));
        }
        if let Some(hint) = req.position_hint {
            if hint != self.columns.len() {
                debug!(hint, actual = self.columns.len(), "column position hint ignored");
            }
        }
        let column = self.push_column(clean_name("column name", &req.name)?).clone();
        self.committed("create_column");
        Ok(column)
    }

    pub fn apply_rename_column(&mut self, req: &RenameColumn) -> Result<()> {
        let name = clean_name("column name", &req.name)?;
        let column = self
            .column_mut(&req.column_id)
            .ok_or_else(|| KanbanError::ColumnNotFound(req.column_id.to_string()))?;
        column.name = name;
        self.committed("rename_column");
        Ok(())
    }

    pub fn apply_reorder_column(&mut self, req: &ReorderColumn) -> Result<()> {
        req.validate()?;
        let source = self.require_column_index(&req.source_column_id)?;
        let destination = self.require_column_index(&req.destination_column_id)?;
        expect_index(req.source_column_id, req.source_index, self.columns[source].index)?;
        expect_index(
            req.destination_column_id,
            req.destination_index,
            self.columns[destination].index,
        )?;

        self.reorder_column(source, destination);
        self.committed("reorder_column");
        Ok(())
    }

    pub fn apply_delete_column(&mut self, req: &DeleteColumn) -> Result<()> {
        let column = self.require_column(&req.column_id)?;
        if !column.tasks.is_empty() {
            return Err(KanbanError::ColumnNotEmpty {
                column: req.column_id.to_string(),
                tasks: column.tasks.len(),
            });
        }
        self.remove_column(&req.column_id)?;
        self.committed("delete_column");
        Ok(())
    }

    /// Returns the number of relocated tasks
    pub fn apply_delete_column_and_reorder_tasks(
        &mut self,
        req: &DeleteColumnAndReorderTasks,
    ) -> Result<usize> {
        req.validate()?;
        self.require_column(&req.column_id)?;
        self.require_column(&req.destination_column_id)?;

        let moved = self.relocate_tasks(&req.column_id, &req.destination_column_id)?;
        self.remove_column(&req.column_id)?;
        self.committed("delete_column_and_reorder_tasks");
        Ok(moved)
    }

    /// Returns the number of deleted tasks
    pub fn apply_delete_column_and_tasks(&mut self, req: &DeleteColumnAndTasks) -> Result<usize> {
        let removed = self.remove_column(&req.column_id)?;
        self.committed("delete_column_and_tasks");
        Ok(removed.tasks.len())
    }

    pub fn apply_create_task(&mut self, req: &CreateTask) -> Result<Task> {
        let title = clean_name("task title", &req.title)?;
        if req.project_id != self.project.id {
            return Err(KanbanError::ProjectNotFound(req.project_id.to_string()));
        }
        let count = self.require_column(&req.column_id)?.tasks.len();
        if let Some(hint) = req.index {
            if hint != count {
                debug!(hint, actual = count, "task index hint ignored");
            }
        }

        let mut task = self.push_task(&req.column_id, title)?.clone();
        task.description = clean_description(req.description.as_deref());
        task.priority = req.priority.unwrap_or_default();
        if let Some(stored) = self.task_mut(&task.id) {
            *stored = task.clone();
        }
        self.committed("create_task");
        Ok(task)
    }

    pub fn apply_update_task(&mut self, req: &UpdateTask) -> Result<Task> {
        req.validate()?;
        let task = self
            .task_mut(&req.task_id)
            .ok_or_else(|| KanbanError::TaskNotFound(req.task_id.to_string()))?;
        if let Some(title) = &req.title {
            task.set_title(clean_name("task title", title)?);
        }
        if let Some(description) = &req.description {
            task.set_description(clean_description(Some(description)));
        }
        if let Some(priority) = req.priority {
            task.set_priority(priority);
        }
        let task = task.clone();
        self.committed("update_task");
        Ok(task)
    }

    pub fn apply_order_task(&mut self, req: &OrderTask) -> Result<()> {
        let column = self.require_column(&req.column_id)?;
        let task = self.require_task(&req.source_task_id)?;
        if task.column_id != req.column_id {
            return Err(KanbanError::TaskNotInColumn {
                task: req.source_task_id.to_string(),
                column: req.column_id.to_string(),
            });
        }
        expect_index(req.source_task_id, req.source_index, task.index)?;
        expect_in_range(req.destination_index, column.tasks.len().saturating_sub(1))?;

        self.reorder_task(&req.column_id, req.source_index, req.destination_index)?;
        self.committed("order_task");
        Ok(())
    }

    pub fn apply_move_task_to_column(&mut self, req: &MoveTaskToColumn) -> Result<()> {
        if let Some(reorder) = req.as_reorder() {
            return self.apply_order_task(&reorder);
        }

        let task = self.require_task(&req.task_id)?;
        if task.column_id != req.old_column_id {
            return Err(KanbanError::TaskNotInColumn {
                task: req.task_id.to_string(),
                column: req.old_column_id.to_string(),
            });
        }
        expect_index(req.task_id, req.old_index, task.index)?;
        let target = self.require_column(&req.new_column_id)?;
        expect_in_range(req.new_index, target.tasks.len())?;

        self.move_task(&req.task_id, &req.new_column_id, req.new_index)?;
        self.committed("move_task_to_column");
        Ok(())
    }

    pub fn apply_delete_task(&mut self, req: &DeleteTask) -> Result<Task> {
        let task = self.remove_task(&req.task_id)?;
        self.committed("delete_task");
        Ok(task)
    }
}
