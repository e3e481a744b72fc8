//! The CRM kanban board: drag contract, reconciliation and presentation

mod board;
mod drag;
mod reconcile;

pub use board::{format_elapsed, time_in_column, Board, BoardColumn};
pub use drag::{DragEnd, DragIntent, DraggableLocation, IgnoreReason};
pub use reconcile::{DragOutcome, KanbanReconciler};
