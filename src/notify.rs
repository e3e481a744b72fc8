//! User-facing notices emitted after every mutating call
//!
//! The web client shows these as toasts. Here they go to a [`Notifier`],
//! which decides how to surface them.

use std::fmt;
use std::sync::Mutex;

/// What the user attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateLead,
    UpdateLead,
    DeleteLead,
    UpdateStatus,
    MoveLead,
    FetchLeads,
    CreateColumn,
    RenameColumn,
    ReorderColumns,
    DeleteColumn,
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Action::CreateLead => "create lead",
            Action::UpdateLead => "update lead",
            Action::DeleteLead => "delete lead",
            Action::UpdateStatus => "update lead status",
            Action::MoveLead => "move lead",
            Action::FetchLeads => "load leads",
            Action::CreateColumn => "create column",
            Action::RenameColumn => "rename column",
            Action::ReorderColumns => "reorder columns",
            Action::DeleteColumn => "delete column",
        }
    }
}

/// A single user-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LeadCreated { name: String },
    LeadUpdated,
    LeadDeleted,
    LeadMoved { column: String },
    ColumnCreated { name: String },
    ColumnRenamed { from: String, to: String, leads: usize },
    ColumnsReordered,
    ColumnDeleted { name: String },
    Failed { action: Action, reason: String },
}

impl Notice {
    pub fn failed(action: Action, reason: impl Into<String>) -> Self {
        Notice::Failed {
            action,
            reason: reason.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Failed { .. })
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::LeadCreated { name } => write!(f, "Lead \"{}\" created", name),
            Notice::LeadUpdated => write!(f, "Lead updated"),
            Notice::LeadDeleted => write!(f, "Lead deleted"),
            Notice::LeadMoved { column } => write!(f, "Lead moved to \"{}\"", column),
            Notice::ColumnCreated { name } => write!(f, "Column \"{}\" created", name),
            Notice::ColumnRenamed { from, to, leads } => write!(
                f,
                "Column \"{}\" renamed to \"{}\" ({} lead(s) carried over)",
                from, to, leads
            ),
            Notice::ColumnsReordered => write!(f, "Columns reordered"),
            Notice::ColumnDeleted { name } => write!(f, "Column \"{}\" deleted", name),
            Notice::Failed { action, reason } => {
                write!(f, "Could not {}: {}", action.describe(), reason)
            }
        }
    }
}

/// Receives notices. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the `tracing` log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        if notice.is_error() {
            tracing::warn!(target: "crm::notice", "{}", notice);
        } else {
            tracing::info!(target: "crm::notice", "{}", notice);
        }
    }
}

/// Keeps every notice in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn errors(&self) -> Vec<Notice> {
        self.notices().into_iter().filter(Notice::is_error).collect()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(
            &mut *self
                .notices
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice);
    }
}
