pub mod board;
pub mod drag;
pub mod ids;
pub mod mutation;
pub mod ordering;
pub mod project;
pub mod task;

pub use board::{Board, Column, DeletionPolicy};
pub use drag::{Commit, DragBoard, DragId};
pub use ids::{ColumnId, ProjectId, TaskId};
pub use mutation::{
    CreateColumn, CreateProject, CreateTask, DeleteColumn, DeleteColumnAndReorderTasks,
    DeleteColumnAndTasks, DeleteTask, MoveTaskToColumn, OrderTask, RenameColumn, ReorderColumn,
    UpdateTask,
};
pub use ordering::Shift;
pub use project::Project;
pub use task::{Priority, Task};
