use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use supabase_crm_postgrest::PostgrestError;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ColumnStore, LeadStore};
use crate::error::{Error, Result};
use crate::models::{Column, ColumnPatch, Lead, LeadInsert, LeadPatch, NewColumn};

/// Calls received by an in-memory store, per operation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCalls {
    pub fetches: usize,
    pub finds: usize,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl StoreCalls {
    pub fn reads(&self) -> usize {
        self.fetches + self.finds
    }

    pub fn writes(&self) -> usize {
        self.inserts + self.updates + self.deletes
    }

    pub fn total(&self) -> usize {
        self.reads() + self.writes()
    }
}

fn injected_failure() -> Error {
    Error::Store(PostgrestError::UnparsedApiError {
        message: "injected failure".to_string(),
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
    })
}

/// [`LeadStore`] kept in process memory.
///
/// Counts every call and can be told to fail reads or writes or to answer
/// slowly, which makes it the store of choice for exercising the
/// reconciliation protocol without a Supabase project.
#[derive(Debug, Default)]
pub struct MemoryLeadStore {
    rows: Mutex<Vec<Lead>>,
    calls: Mutex<StoreCalls>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    latency: Duration,
}

impl MemoryLeadStore {
    /// Store holding one lead per `(id, status)` pair, oldest first
    pub fn seeded(rows: &[(&str, &str)]) -> Self {
        let base = Utc::now() - chrono::Duration::hours(rows.len() as i64);
        let leads = rows
            .iter()
            .enumerate()
            .map(|(i, (id, status))| {
                let created_at = base + chrono::Duration::hours(i as i64);
                Lead {
                    id: id.to_string(),
                    name: format!("Lead {}", id),
                    email: format!("{}@example.com", id.to_lowercase()),
                    phone: "11999990000".to_string(),
                    notes: None,
                    status: status.to_string(),
                    status_changed_at: Some(created_at),
                    source: Some("manual".to_string()),
                    created_at,
                    updated_at: None,
                }
            })
            .collect();
        Self {
            rows: Mutex::new(leads),
            ..Self::default()
        }
    }

    /// Delay applied to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> StoreCalls {
        *self.calls.lock().await
    }

    pub async fn reset_calls(&self) {
        *self.calls.lock().await = StoreCalls::default();
    }

    /// Current rows, without counting as a call
    pub async fn snapshot(&self) -> Vec<Lead> {
        self.rows.lock().await.clone()
    }

    /// Current row for `id`, without counting as a call
    pub async fn peek(&self, id: &str) -> Option<Lead> {
        self.rows.lock().await.iter().find(|l| l.id == id).cloned()
    }

    /// Remove a row behind the client's back, as another session would
    pub async fn remove_externally(&self, id: &str) {
        self.rows.lock().await.retain(|l| l.id != id);
    }

    /// Overwrite a row's status behind the client's back
    pub async fn set_status_externally(&self, id: &str, status: &str) {
        if let Some(lead) = self.rows.lock().await.iter_mut().find(|l| l.id == id) {
            lead.status = status.to_string();
            lead.status_changed_at = Some(Utc::now());
        }
    }

    async fn enter(&self, record: impl FnOnce(&mut StoreCalls)) {
        record(&mut *self.calls.lock().await);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn fetch_all(&self) -> Result<Vec<Lead>> {
        self.enter(|c| c.fetches += 1).await;
        self.check_reads()?;
        let mut leads = self.rows.lock().await.clone();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn find(&self, id: &str) -> Result<Option<Lead>> {
        self.enter(|c| c.finds += 1).await;
        self.check_reads()?;
        Ok(self.peek(id).await)
    }

    async fn insert(&self, lead: &LeadInsert) -> Result<Lead> {
        self.enter(|c| c.inserts += 1).await;
        self.check_writes()?;
        let now = Utc::now();
        let stored = Lead {
            id: Uuid::new_v4().to_string(),
            name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            notes: lead.notes.clone(),
            status: lead.status.clone(),
            status_changed_at: Some(lead.status_changed_at),
            source: Some(lead.source.clone()),
            created_at: now,
            updated_at: Some(now),
        };
        self.rows.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &str, patch: &LeadPatch) -> Result<()> {
        self.enter(|c| c.updates += 1).await;
        self.check_writes()?;
        let mut rows = self.rows.lock().await;
        let lead = rows
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::not_found(format!("lead {}", id)))?;
        apply_patch(lead, patch);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.enter(|c| c.deletes += 1).await;
        self.check_writes()?;
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|l| l.id != id);
        if rows.len() == before {
            return Err(Error::not_found(format!("lead {}", id)));
        }
        Ok(())
    }

    async fn count_with_status(&self, status: &str) -> Result<usize> {
        self.enter(|c| c.fetches += 1).await;
        self.check_reads()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|l| l.status == status)
            .count())
    }

    async fn reassign_status(
        &self,
        from: &str,
        to: &str,
        changed_at: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        self.enter(|c| c.updates += 1).await;
        self.check_writes()?;
        let patch = LeadPatch {
            status: Some(to.to_string()),
            status_changed_at: changed_at,
            updated_at: Some(Utc::now()),
            ..LeadPatch::default()
        };
        let mut moved = 0;
        for lead in self.rows.lock().await.iter_mut().filter(|l| l.status == from) {
            apply_patch(lead, &patch);
            moved += 1;
        }
        Ok(moved)
    }
}

fn apply_patch(lead: &mut Lead, patch: &LeadPatch) {
    if let Some(name) = &patch.name {
        lead.name = name.clone();
    }
    if let Some(email) = &patch.email {
        lead.email = email.clone();
    }
    if let Some(phone) = &patch.phone {
        lead.phone = phone.clone();
    }
    if let Some(notes) = &patch.notes {
        lead.notes = Some(notes.clone());
    }
    if let Some(status) = &patch.status {
        lead.status = status.clone();
    }
    if let Some(at) = patch.status_changed_at {
        lead.status_changed_at = Some(at);
    }
    if let Some(at) = patch.updated_at {
        lead.updated_at = Some(at);
    }
}

/// [`ColumnStore`] kept in process memory
#[derive(Debug, Default)]
pub struct MemoryColumnStore {
    rows: Mutex<Vec<Column>>,
    calls: Mutex<StoreCalls>,
    fail_writes: AtomicBool,
}

impl MemoryColumnStore {
    /// Columns named `names`, positioned in the given order, ids `C1..`
    pub fn seeded(names: &[&str]) -> Self {
        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| Column {
                id: format!("C{}", i + 1),
                name: name.to_string(),
                position: i as i32,
                created_at: Some(Utc::now()),
            })
            .collect();
        Self {
            rows: Mutex::new(columns),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> StoreCalls {
        *self.calls.lock().await
    }

    /// Current rows ordered by position, without counting as a call
    pub async fn snapshot(&self) -> Vec<Column> {
        let mut columns = self.rows.lock().await.clone();
        columns.sort_by_key(|c| c.position);
        columns
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }
}

#[async_trait]
impl ColumnStore for MemoryColumnStore {
    async fn fetch_all(&self) -> Result<Vec<Column>> {
        self.calls.lock().await.fetches += 1;
        Ok(self.snapshot().await)
    }

    async fn insert(&self, column: &NewColumn) -> Result<Column> {
        self.calls.lock().await.inserts += 1;
        self.check_writes()?;
        let stored = Column {
            id: Uuid::new_v4().to_string(),
            name: column.name.clone(),
            position: column.position,
            created_at: Some(Utc::now()),
        };
        self.rows.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &str, patch: &ColumnPatch) -> Result<()> {
        self.calls.lock().await.updates += 1;
        self.check_writes()?;
        let mut rows = self.rows.lock().await;
        let column = rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found(format!("column {}", id)))?;
        if let Some(name) = &patch.name {
            column.name = name.clone();
        }
        if let Some(position) = patch.position {
            column.position = position;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.calls.lock().await.deletes += 1;
        self.check_writes()?;
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|c| c.id != id);
        if rows.len() == before {
            return Err(Error::not_found(format!("column {}", id)));
        }
        Ok(())
    }
}
