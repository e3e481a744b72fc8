//! Supabase CRM kanban core
//!
//! Lead and column management for a CRM whose data lives in a Supabase
//! project, plus the kanban protocol that turns a card drag into a guarded
//! status update followed by a full refetch.

pub mod columns;
pub mod config;
pub mod error;
pub mod kanban;
pub mod leads;
pub mod models;
pub mod notify;
pub mod store;

use reqwest::Client;
use std::sync::Arc;

use crate::columns::ColumnOperations;
use crate::config::{ClientOptions, CrmConfig};
use crate::error::Result;
use crate::kanban::{Board, KanbanReconciler};
use crate::leads::LeadOperations;
use crate::notify::Notifier;
use crate::store::{ColumnStore, LeadStore, PostgrestColumnStore, PostgrestLeadStore};

/// The main entry point: stores and operations wired to one Supabase project
pub struct Crm {
    /// Connection settings
    pub config: CrmConfig,
    /// Client options
    pub options: ClientOptions,
    leads: Arc<dyn LeadStore>,
    columns: Arc<dyn ColumnStore>,
}

impl Crm {
    /// Create a client for the project described by `config`
    ///
    /// # Example
    ///
    /// ```
    /// use supabase_crm::{Crm, config::{ClientOptions, CrmConfig}};
    ///
    /// let config = CrmConfig::new("https://your-project-url.supabase.co", "your-anon-key").unwrap();
    /// let crm = Crm::new(config, ClientOptions::default()).unwrap();
    /// ```
    pub fn new(config: CrmConfig, options: ClientOptions) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let leads = Arc::new(PostgrestLeadStore::new(&config, http_client.clone()));
        let columns = Arc::new(PostgrestColumnStore::new(&config, http_client));
        Ok(Self::with_stores(config, options, leads, columns))
    }

    /// Create a client over caller-provided stores
    pub fn with_stores(
        config: CrmConfig,
        options: ClientOptions,
        leads: Arc<dyn LeadStore>,
        columns: Arc<dyn ColumnStore>,
    ) -> Self {
        Self {
            config,
            options,
            leads,
            columns,
        }
    }

    pub fn lead_store(&self) -> Arc<dyn LeadStore> {
        self.leads.clone()
    }

    /// Lead operations reporting to `notifier`
    pub fn lead_operations(&self, notifier: Arc<dyn Notifier>) -> Arc<LeadOperations> {
        Arc::new(LeadOperations::new(
            self.leads.clone(),
            notifier,
            self.options.clone(),
        ))
    }

    /// Column operations reporting to `notifier`
    pub fn column_operations(&self, notifier: Arc<dyn Notifier>) -> ColumnOperations {
        ColumnOperations::new(self.columns.clone(), self.leads.clone(), notifier)
    }

    /// A kanban board reconciler sharing `ops`, so drags and direct edits
    /// of the same lead are serialized and see one cache
    pub fn reconciler(&self, ops: Arc<LeadOperations>) -> KanbanReconciler {
        KanbanReconciler::new(ops)
    }

    /// Fetch columns and leads and group them
    pub async fn board(&self) -> Result<Board> {
        let (columns, leads) = tokio::try_join!(self.columns.fetch_all(), self.leads.fetch_all())?;
        Ok(Board::build(&columns, &leads))
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::columns::{ColumnOperations, DeletePolicy};
    pub use crate::config::{ClientOptions, CrmConfig};
    pub use crate::error::{Error, Result};
    pub use crate::kanban::{Board, DragEnd, DragOutcome, DraggableLocation, KanbanReconciler};
    pub use crate::leads::LeadOperations;
    pub use crate::models::{Column, Lead, LeadUpdate, NewLead};
    pub use crate::notify::{Notice, Notifier, RecordingNotifier, TracingNotifier};
    pub use crate::Crm;
}
