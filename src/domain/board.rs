use crate::{
    domain::{
        ids::{ColumnId, ProjectId, TaskId},
        ordering::{is_dense, move_item, renumber, Indexed},
        project::Project,
        task::Task,
    },
    error::{KanbanError, Result},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A board column holding an ordered list of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub project_id: ProjectId,
    pub name: String,
    /// Position among the project's columns
    pub index: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Column {
    pub fn new(project_id: ProjectId, name: String, index: usize) -> Self {
        Self {
            id: ColumnId::new(),
            project_id,
            name,
            index,
            created_at: Utc::now(),
            tasks: Vec::new(),
        }
    }

    pub fn task_position(&self, task_id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == task_id)
    }
}

impl Indexed for Column {
    fn index(&self) -> usize {
        self.index
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

/// Which of the three deletion branches applies to a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// No tasks: the column can simply be removed
    Empty,
    /// Has tasks and other columns exist: tasks must be moved to one of these
    Relocate { candidates: Vec<ColumnId> },
    /// Has tasks and is the only column: deleting it deletes the tasks too
    Cascade,
}

/// A project's board: columns ordered by index, each with its ordered tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub project: Project,
    pub columns: Vec<Column>,
    /// Bumped by every committed mutation of this board
    #[serde(default)]
    pub version: u64,
}

impl Board {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            columns: Vec::new(),
            version: 0,
        }
    }

    pub fn id(&self) -> &ProjectId {
        &self.project.id
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_position(&self, column_id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|column| &column.id == column_id)
    }

    pub fn column(&self, column_id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| &column.id == column_id)
    }

    pub fn column_mut(&mut self, column_id: &ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|column| &column.id == column_id)
    }

    /// Finds a task as `(column position, task position)`.
    ///
    /// Linear scan over columns, then over each column's tasks.
    pub fn locate_task(&self, task_id: &TaskId) -> Option<(usize, usize)> {
        self.columns
            .iter()
            .enumerate()
            .find_map(|(c, column)| column.task_position(task_id).map(|t| (c, t)))
    }

    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.locate_task(task_id)
            .map(|(c, t)| &self.columns[c].tasks[t])
    }

    pub fn task_mut(&mut self, task_id: &TaskId) -> Option<&mut Task> {
        let (c, t) = self.locate_task(task_id)?;
        Some(&mut self.columns[c].tasks[t])
    }

    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|column| column.tasks.len()).sum()
    }

    pub(crate) fn require_column(&self, column_id: &ColumnId) -> Result<&Column> {
        self.column(column_id)
            .ok_or_else(|| KanbanError::ColumnNotFound(column_id.to_string()))
    }

    pub(crate) fn require_task(&self, task_id: &TaskId) -> Result<&Task> {
        self.task(task_id)
            .ok_or_else(|| KanbanError::TaskNotFound(task_id.to_string()))
    }

    /// Appends a new column at the end of the board
    pub fn push_column(&mut self, name: String) -> &Column {
        let index = self.columns.len();
        self.columns.push(Column::new(self.project.id, name, index));
        &self.columns[index]
    }

    /// Appends a new task at the end of a column
    pub fn push_task(&mut self, column_id: &ColumnId, title: String) -> Result<&Task> {
        let project_id = self.project.id;
        let column = self
            .column_mut(column_id)
            .ok_or_else(|| KanbanError::ColumnNotFound(column_id.to_string()))?;
        let index = column.tasks.len();
        column
            .tasks
            .push(Task::new(project_id, column.id, title, index));
        Ok(&column.tasks[index])
    }

    /// Repositions a task inside its column and renumbers that column
    pub fn reorder_task(&mut self, column_id: &ColumnId, from: usize, to: usize) -> Result<()> {
        let column = self
            .column_mut(column_id)
            .ok_or_else(|| KanbanError::ColumnNotFound(column_id.to_string()))?;
        move_item(&mut column.tasks, from, to);
        renumber(&mut column.tasks);
        Ok(())
    }

    /// Re-parents a task: closes the gap in its old column and inserts it at
    /// `to_index` (clamped to the end) of the target column.
    pub fn move_task(
        &mut self,
        task_id: &TaskId,
        to_column: &ColumnId,
        to_index: usize,
    ) -> Result<()> {
        let target = self
            .column_position(to_column)
            .ok_or_else(|| KanbanError::ColumnNotFound(to_column.to_string()))?;
        let (source, position) = self
            .locate_task(task_id)
            .ok_or_else(|| KanbanError::TaskNotFound(task_id.to_string()))?;

        if source == target {
            return self.reorder_task(to_column, position, to_index);
        }

        let mut task = self.columns[source].tasks.remove(position);
        renumber(&mut self.columns[source].tasks);

        let tasks = &mut self.columns[target].tasks;
        task.column_id = *to_column;
        task.updated_at = Utc::now();
        tasks.insert(to_index.min(tasks.len()), task);
        renumber(tasks);
        Ok(())
    }

    /// Repositions a column among its siblings and renumbers all columns
    pub fn reorder_column(&mut self, from: usize, to: usize) {
        move_item(&mut self.columns, from, to);
        renumber(&mut self.columns);
    }

    /// Removes a column (with whatever tasks it still holds) and closes the gap
    pub fn remove_column(&mut self, column_id: &ColumnId) -> Result<Column> {
        let position = self
            .column_position(column_id)
            .ok_or_else(|| KanbanError::ColumnNotFound(column_id.to_string()))?;
        let column = self.columns.remove(position);
        renumber(&mut self.columns);
        Ok(column)
    }

    /// Moves every task of `from` to the end of `to`, keeping their relative
    /// order. Returns how many tasks were moved.
    pub fn relocate_tasks(&mut self, from: &ColumnId, to: &ColumnId) -> Result<usize> {
        let source = self
            .column_position(from)
            .ok_or_else(|| KanbanError::ColumnNotFound(from.to_string()))?;
        let target = self
            .column_position(to)
            .ok_or_else(|| KanbanError::ColumnNotFound(to.to_string()))?;
        if source == target {
            return Ok(0);
        }

        let moved: Vec<Task> = self.columns[source].tasks.drain(..).collect();
        let count = moved.len();
        let now = Utc::now();
        let tasks = &mut self.columns[target].tasks;
        tasks.extend(moved.into_iter().map(|mut task| {
            task.column_id = *to;
            task.updated_at = now;
            task
        }));
        renumber(tasks);
        Ok(count)
    }

    /// Removes a task and closes the gap in its column
    pub fn remove_task(&mut self, task_id: &TaskId) -> Result<Task> {
        let (c, t) = self
            .locate_task(task_id)
            .ok_or_else(|| KanbanError::TaskNotFound(task_id.to_string()))?;
        let task = self.columns[c].tasks.remove(t);
        renumber(&mut self.columns[c].tasks);
        Ok(task)
    }

    /// Selects the deletion branch for a column
    pub fn deletion_policy(&self, column_id: &ColumnId) -> Result<DeletionPolicy> {
        let column = self.require_column(column_id)?;
        if column.tasks.is_empty() {
            return Ok(DeletionPolicy::Empty);
        }

        let candidates: Vec<ColumnId> = self
            .columns
            .iter()
            .filter(|other| &other.id != column_id)
            .map(|other| other.id)
            .collect();

        if candidates.is_empty() {
            Ok(DeletionPolicy::Cascade)
        } else {
            Ok(DeletionPolicy::Relocate { candidates })
        }
    }

    /// Verifies the ordering invariants: columns and each column's tasks are
    /// densely indexed, stored in index order, and tasks point at their column.
    pub fn check_density(&self) -> Result<()> {
        if !is_dense(self.columns.iter().map(Indexed::index)) {
            return Err(KanbanError::Corrupt(format!(
                "column indices of project {} are not dense",
                self.project.id
            )));
        }
        for (position, column) in self.columns.iter().enumerate() {
            if column.index != position {
                return Err(KanbanError::Corrupt(format!(
                    "column {} stored at {} has index {}",
                    column.id, position, column.index
                )));
            }
            for (task_position, task) in column.tasks.iter().enumerate() {
                if task.index != task_position {
                    return Err(KanbanError::Corrupt(format!(
                        "task {} stored at {} has index {}",
                        task.id, task_position, task.index
                    )));
                }
                if task.column_id != column.id {
                    return Err(KanbanError::Corrupt(format!(
                        "task {} listed under column {} but points at {}",
                        task.id, column.id, task.column_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Sorts columns and tasks by their stored index
    pub(crate) fn sort_by_index(&mut self) {
        self.columns.sort_by_key(|column| column.index);
        for column in &mut self.columns {
            column.tasks.sort_by_key(|task| task.index);
        }
    }
}
