//! # Kanban Core
//!
//! Board state and ordering for multi-project kanban boards.
//!
//! Columns within a project and tasks within a column keep a dense, gapless
//! 0-based `index`. This crate owns every operation that changes those
//! indices: the authoritative, transactional mutations behind the
//! [`Storage`] trait, and the optimistic drag-and-drop reducer
//! ([`DragBoard`]) that previews moves before they are persisted.

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use domain::{
    board::{Board, Column, DeletionPolicy},
    drag::{Commit, DragBoard, DragId},
    ids::{ColumnId, ProjectId, TaskId},
    project::Project,
    task::{Priority, Task},
};
pub use error::{KanbanError, Result};
pub use storage::{open_storage, Storage};
