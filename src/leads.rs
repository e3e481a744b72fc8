//! Lead operations: the guarded write path into the lead store
//!
//! Every operation comes in two forms. `try_*` returns the failure so the
//! caller can inspect it; the plain form catches it at this boundary,
//! emits a [`Notice`] and reports a `bool`, which is what the board uses.
//!
//! The in-memory lead list is a cache that is replaced wholesale by
//! [`LeadOperations::fetch_leads`]. It is never patched after a write.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::models::{Lead, LeadInsert, LeadPatch, LeadUpdate, NewLead};
use crate::notify::{Action, Notice, Notifier};
use crate::store::LeadStore;

/// Result of a status update that went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// The lead already had the requested status; nothing was written
    Unchanged,
    /// The status was written and `status_changed_at` stamped with `at`
    Changed {
        from: String,
        to: String,
        at: DateTime<Utc>,
    },
}

/// Create / update / delete / move leads against a [`LeadStore`]
pub struct LeadOperations {
    store: Arc<dyn LeadStore>,
    notifier: Arc<dyn Notifier>,
    options: ClientOptions,
    cache: RwLock<Vec<Lead>>,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LeadOperations {
    pub fn new(
        store: Arc<dyn LeadStore>,
        notifier: Arc<dyn Notifier>,
        options: ClientOptions,
    ) -> Self {
        Self {
            store,
            notifier,
            options,
            cache: RwLock::new(Vec::new()),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Leads as of the last successful fetch
    pub async fn leads(&self) -> Vec<Lead> {
        self.cache.read().await.clone()
    }

    /// Reload every lead and replace the cached list
    pub async fn try_fetch_leads(&self) -> Result<usize> {
        let leads = self.store.fetch_all().await?;
        let count = leads.len();
        *self.cache.write().await = leads;
        debug!(count, "lead list refreshed");
        Ok(count)
    }

    pub async fn fetch_leads(&self) -> bool {
        match self.try_fetch_leads().await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "failed to fetch leads");
                self.notifier
                    .notify(Notice::failed(Action::FetchLeads, e.user_message()));
                false
            }
        }
    }

    pub async fn try_create(&self, lead: NewLead) -> Result<Lead> {
        let missing = lead.missing_fields();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let insert = LeadInsert {
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            notes: lead.notes.filter(|n| !n.trim().is_empty()),
            status: lead.status,
            status_changed_at: Utc::now(),
            source: lead
                .source
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| self.options.default_source.clone()),
        };
        let stored = self.store.insert(&insert).await?;
        info!(lead_id = %stored.id, status = %stored.status, "lead created");
        Ok(stored)
    }

    pub async fn create(&self, lead: NewLead) -> bool {
        match self.try_create(lead).await {
            Ok(stored) => {
                self.notifier.notify(Notice::LeadCreated { name: stored.name });
                self.fetch_leads().await;
                true
            }
            Err(e) => self.report(Action::CreateLead, &e),
        }
    }

    /// Apply `update`. `status_changed_at` is stamped only when the status
    /// actually changes.
    pub async fn try_update(&self, id: &str, update: LeadUpdate) -> Result<()> {
        require_non_empty("lead id", id)?;
        if let Some(status) = &update.status {
            require_non_empty("status", status)?;
        }
        let status = update.status.as_deref().map(|s| s.trim().to_string());

        let _guard = self.lock_lead(id).await;
        let current = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("lead {}", id)))?;

        let now = Utc::now();
        let status_changed = status
            .as_deref()
            .map_or(false, |status| status != current.status);

        let patch = LeadPatch {
            name: update.name,
            email: update.email,
            phone: update.phone,
            notes: update.notes,
            status,
            status_changed_at: status_changed.then_some(now),
            updated_at: Some(now),
        };
        self.store.update(id, &patch).await?;
        info!(lead_id = %id, status_changed, "lead updated");
        Ok(())
    }

    pub async fn update(&self, id: &str, update: LeadUpdate) -> bool {
        match self.try_update(id, update).await {
            Ok(()) => {
                self.notifier.notify(Notice::LeadUpdated);
                self.fetch_leads().await;
                true
            }
            Err(e) => self.report(Action::UpdateLead, &e),
        }
    }

    /// Delete without asking. Callers are expected to have confirmed.
    pub async fn try_delete(&self, id: &str) -> Result<()> {
        require_non_empty("lead id", id)?;
        let _guard = self.lock_lead(id).await;
        self.store.delete(id).await?;
        info!(lead_id = %id, "lead deleted");
        Ok(())
    }

    /// Delete once `confirm` agrees. A refusal touches nothing and returns
    /// `false` without a notice.
    pub async fn delete<F>(&self, id: &str, confirm: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        if !confirm() {
            debug!(lead_id = %id, "delete not confirmed");
            return false;
        }
        match self.try_delete(id).await {
            Ok(()) => {
                self.notifier.notify(Notice::LeadDeleted);
                self.fetch_leads().await;
                true
            }
            Err(e) => self.report(Action::DeleteLead, &e),
        }
    }

    /// Move a lead to `new_status`.
    ///
    /// Read, write and verification are strictly sequenced and serialized
    /// per lead. Requesting the status the lead already has writes nothing.
    pub async fn try_update_status(&self, id: &str, new_status: &str) -> Result<StatusChange> {
        require_non_empty("lead id", id)?;
        require_non_empty("status", new_status)?;
        let new_status = new_status.trim();

        let _guard = self.lock_lead(id).await;
        pause(self.options.status_update_delay).await;

        let current = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("lead {}", id)))?;

        if current.status == new_status {
            debug!(lead_id = %id, status = %new_status, "status unchanged, skipping write");
            return Ok(StatusChange::Unchanged);
        }

        let now = Utc::now();
        self.store
            .update(id, &LeadPatch::status_change(new_status, now))
            .await?;

        match self.store.find(id).await {
            Ok(Some(lead)) if lead.status == new_status => {
                debug!(lead_id = %id, status = %new_status, "status write verified");
            }
            Ok(Some(lead)) => {
                warn!(lead_id = %id, expected = %new_status, found = %lead.status, "status write not visible yet");
            }
            Ok(None) => warn!(lead_id = %id, "lead vanished right after status write"),
            Err(e) => warn!(lead_id = %id, error = %e, "could not verify status write"),
        }

        pause(self.options.settle_delay).await;
        info!(lead_id = %id, from = %current.status, to = %new_status, "lead status changed");
        Ok(StatusChange::Changed {
            from: current.status,
            to: new_status.to_string(),
            at: now,
        })
    }

    /// Move a lead, reporting failure as a notice. No success notice is
    /// emitted; the board announces the move itself.
    pub async fn update_status(&self, id: &str, new_status: &str) -> bool {
        match self.try_update_status(id, new_status).await {
            Ok(_) => true,
            Err(e) => self.report(Action::UpdateStatus, &e),
        }
    }

    fn report(&self, action: Action, e: &Error) -> bool {
        if e.is_validation() {
            warn!(?action, error = %e, "rejected input");
        } else {
            error!(?action, error = %e, "lead operation failed");
        }
        self.notifier.notify(Notice::failed(action, e.user_message()));
        false
    }

    async fn lock_lead(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

async fn pause(delay: std::time::Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
