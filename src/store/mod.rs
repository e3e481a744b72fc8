//! Access to the remote `leads` and `kanban_columns` tables
//!
//! The stores are the only authority on lead and column state. Everything
//! above them treats what they return as ground truth and never patches a
//! local copy in place.

mod memory;
mod postgrest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Column, ColumnPatch, Lead, LeadInsert, LeadPatch, NewColumn};

pub use memory::{MemoryColumnStore, MemoryLeadStore, StoreCalls};
pub use postgrest::{PostgrestColumnStore, PostgrestLeadStore};

/// Lead table operations the CRM relies on
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Every lead, newest first
    async fn fetch_all(&self) -> Result<Vec<Lead>>;

    /// Point read by id
    async fn find(&self, id: &str) -> Result<Option<Lead>>;

    /// Insert and return the stored row
    async fn insert(&self, lead: &LeadInsert) -> Result<Lead>;

    /// Apply `patch` to the lead. `Error::NotFound` when no row matched.
    async fn update(&self, id: &str, patch: &LeadPatch) -> Result<()>;

    /// Remove the lead. `Error::NotFound` when no row matched.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Number of leads whose status is `status`
    async fn count_with_status(&self, status: &str) -> Result<usize>;

    /// Move every lead in `from` to `to`. `changed_at` stamps
    /// `status_changed_at` when set; renames pass `None`.
    async fn reassign_status(
        &self,
        from: &str,
        to: &str,
        changed_at: Option<DateTime<Utc>>,
    ) -> Result<usize>;
}

/// Column table operations
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Every column, ordered by position
    async fn fetch_all(&self) -> Result<Vec<Column>>;

    /// Insert and return the stored row
    async fn insert(&self, column: &NewColumn) -> Result<Column>;

    /// Apply `patch` to the column. `Error::NotFound` when no row matched.
    async fn update(&self, id: &str, patch: &ColumnPatch) -> Result<()>;

    /// Remove the column. `Error::NotFound` when no row matched.
    async fn delete(&self, id: &str) -> Result<()>;
}
