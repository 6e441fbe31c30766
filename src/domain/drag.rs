//! Optimistic drag-and-drop reducer for the board view.
//!
//! The reducer keeps two copies of a board: `committed`, the last snapshot
//! fetched from storage, and `working`, the projection the UI renders while
//! gestures are in flight. Hovering a task over another column previews the
//! re-parenting locally; nothing is persisted until the drop, which yields at
//! most one [`Commit`] for the caller to send.

use crate::domain::{
    board::Board,
    ids::{ColumnId, TaskId},
    mutation::{MoveTaskToColumn, OrderTask, ReorderColumn},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The entity under the pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum DragId {
    Task(TaskId),
    Column(ColumnId),
}

/// The single mutation a completed gesture asks storage to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Commit {
    OrderTask(OrderTask),
    MoveTaskToColumn(MoveTaskToColumn),
    ReorderColumn(ReorderColumn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Task { column: ColumnId, index: usize },
    Column { index: usize },
}

#[derive(Debug, Clone)]
pub struct DragBoard {
    committed: Board,
    working: Board,
    active: Option<DragId>,
    origin: Option<Origin>,
    /// `working` as it was when the current gesture started
    gesture_base: Option<Board>,
}

impl DragBoard {
    pub fn new(board: Board) -> Self {
        Self {
            working: board.clone(),
            committed: board,
            active: None,
            origin: None,
            gesture_base: None,
        }
    }

    /// The board to render
    pub fn board(&self) -> &Board {
        &self.working
    }

    pub fn committed(&self) -> &Board {
        &self.committed
    }

    pub fn active(&self) -> Option<DragId> {
        self.active
    }

    /// Resolves the column an id lives in: the column itself, or the column
    /// holding the task.
    pub fn container_of(&self, id: DragId) -> Option<ColumnId> {
        match id {
            DragId::Column(column_id) => self.working.column(&column_id).map(|c| c.id),
            DragId::Task(task_id) => self
                .working
                .locate_task(&task_id)
                .map(|(c, _)| self.working.columns[c].id),
        }
    }

    pub fn drag_start(&mut self, id: DragId) {
        self.origin = match id {
            DragId::Task(task_id) => self.working.task(&task_id).map(|task| Origin::Task {
                column: task.column_id,
                index: task.index,
            }),
            DragId::Column(column_id) => self
                .working
                .column(&column_id)
                .map(|column| Origin::Column {
                    index: column.index,
                }),
        };
        self.active = self.origin.map(|_| id);
        self.gesture_base = self.origin.map(|_| self.working.clone());
    }

    fn is_active(&self, id: DragId) -> bool {
        self.active == Some(id)
    }

    /// Cross-column preview: a task hovering over another column moves to
    /// the end of that column. Purely local.
    pub fn drag_over(&mut self, active: DragId, over: DragId) {
        if !self.is_active(active) {
            return;
        }
        let DragId::Task(task_id) = active else {
            return;
        };
        let (Some(source), Some(destination)) = (self.container_of(active), self.container_of(over))
        else {
            return;
        };
        if source == destination {
            return;
        }

        let end = self
            .working
            .column(&destination)
            .map(|column| column.tasks.len())
            .unwrap_or(0);
        if self.working.move_task(&task_id, &destination, end).is_ok() {
            debug!(task = %task_id, column = %destination, "drag preview re-parented task");
        }
    }

    /// Finishes the gesture and returns the mutation to persist, if the
    /// drop changed anything.
    pub fn drag_end(&mut self, active: DragId, over: Option<DragId>) -> Option<Commit> {
        if !self.is_active(active) {
            return None;
        }
        let origin = self.origin.take();
        self.active = None;
        self.gesture_base = None;

        match (active, origin) {
            (DragId::Task(task_id), Some(Origin::Task { column, index })) => {
                self.drop_task(task_id, over, column, index)
            }
            (DragId::Column(column_id), Some(Origin::Column { index })) => {
                self.drop_column(column_id, over, index)
            }
            _ => None,
        }
    }

    fn drop_task(
        &mut self,
        task_id: TaskId,
        over: Option<DragId>,
        origin_column: ColumnId,
        origin_index: usize,
    ) -> Option<Commit> {
        let (c, from) = self.working.locate_task(&task_id)?;
        let current_column = self.working.columns[c].id;

        if let Some(DragId::Task(over_id)) = over {
            if let Some((over_c, to)) = self.working.locate_task(&over_id) {
                if over_c == c && to != from {
                    self.working.reorder_task(&current_column, from, to).ok()?;
                }
            }
        }

        let final_index = self.working.task(&task_id)?.index;
        if current_column != origin_column {
            Some(Commit::MoveTaskToColumn(MoveTaskToColumn {
                task_id,
                old_column_id: origin_column,
                new_column_id: current_column,
                old_index: origin_index,
                new_index: final_index,
            }))
        } else if final_index != origin_index {
            Some(Commit::OrderTask(OrderTask {
                column_id: current_column,
                source_task_id: task_id,
                source_index: origin_index,
                destination_index: final_index,
            }))
        } else {
            None
        }
    }

    fn drop_column(
        &mut self,
        column_id: ColumnId,
        over: Option<DragId>,
        origin_index: usize,
    ) -> Option<Commit> {
        let target_id = over.and_then(|id| self.container_of(id))?;
        let from = self.working.column_position(&column_id)?;
        let to = self.working.column_position(&target_id)?;
        if from == to {
            return None;
        }

        self.working.reorder_column(from, to);

        Some(Commit::ReorderColumn(ReorderColumn {
            source_column_id: column_id,
            source_index: origin_index,
            destination_column_id: target_id,
            destination_index: to,
        }))
    }

    /// Abandons the gesture and the preview it produced. Earlier drops stay
    /// in place.
    pub fn drag_cancel(&mut self) {
        self.active = None;
        self.origin = None;
        if let Some(base) = self.gesture_base.take() {
            self.working = base;
        }
    }

    /// Discards every optimistic change after a commit was rejected
    pub fn rollback(&mut self) {
        self.active = None;
        self.origin = None;
        self.gesture_base = None;
        self.working = self.committed.clone();
    }

    /// Installs a freshly fetched board. Snapshots older than the committed
    /// one are ignored; returns whether the snapshot was applied.
    pub fn apply_snapshot(&mut self, board: Board) -> bool {
        if board.project.id == self.committed.project.id && board.version < self.committed.version
        {
            debug!(
                stale = board.version,
                current = self.committed.version,
                "dropping stale board snapshot"
            );
            return false;
        }
        self.active = None;
        self.origin = None;
        self.gesture_base = None;
        self.working = board.clone();
        self.committed = board;
        true
    }
}
