//! Configuration for the CRM client

use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Status given to leads created without one
pub const DEFAULT_STATUS: &str = "Novo";

/// Source tag given to leads created without one
pub const DEFAULT_SOURCE: &str = "manual";

/// Connection settings for the Supabase project
#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: Url,
    /// Anonymous API key, sent as `apikey`
    pub anon_key: String,
    /// User access token; the anon key is used as bearer when absent
    pub access_token: Option<String>,
    /// Table holding leads
    pub leads_table: String,
    /// Table holding kanban columns
    pub columns_table: String,
}

impl CrmConfig {
    /// Creates a new configuration, validating the URL and key.
    pub fn new(url_str: &str, anon_key: &str) -> Result<Self> {
        let url = Url::parse(url_str)?;
        if anon_key.trim().is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }
        Ok(Self {
            url,
            anon_key: anon_key.to_string(),
            access_token: None,
            leads_table: "leads".to_string(),
            columns_table: "kanban_columns".to_string(),
        })
    }

    /// Reads `SUPABASE_URL`, `SUPABASE_ANON_KEY` and the optional
    /// `SUPABASE_ACCESS_TOKEN`, `CRM_LEADS_TABLE`, `CRM_COLUMNS_TABLE`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;

        let mut config = Self::new(&url, &anon_key)?;
        if let Ok(token) = std::env::var("SUPABASE_ACCESS_TOKEN") {
            config = config.with_access_token(&token);
        }
        if let Ok(table) = std::env::var("CRM_LEADS_TABLE") {
            config = config.with_leads_table(&table);
        }
        if let Ok(table) = std::env::var("CRM_COLUMNS_TABLE") {
            config = config.with_columns_table(&table);
        }
        Ok(config)
    }

    /// Set the user access token
    pub fn with_access_token(mut self, token: &str) -> Self {
        if !token.trim().is_empty() {
            self.access_token = Some(token.to_string());
        }
        self
    }

    /// Set the leads table name
    pub fn with_leads_table(mut self, table: &str) -> Self {
        self.leads_table = table.to_string();
        self
    }

    /// Set the columns table name
    pub fn with_columns_table(mut self, table: &str) -> Self {
        self.columns_table = table.to_string();
        self
    }

    /// Token sent as `Authorization: Bearer`
    pub fn bearer_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    /// Project URL without a trailing slash
    pub fn base_url(&self) -> String {
        self.url.as_str().trim_end_matches('/').to_string()
    }
}

/// Timing and defaults for lead operations and the kanban board
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Wait before touching the store in a status update
    pub status_update_delay: Duration,

    /// Wait after a status write before the caller refetches
    pub settle_delay: Duration,

    /// Grace period before the board accepts the next drag
    pub drag_release_delay: Duration,

    /// Status of leads created without one
    pub default_status: String,

    /// Source tag of leads created without one
    pub default_source: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            status_update_delay: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
            drag_release_delay: Duration::from_millis(50),
            default_status: DEFAULT_STATUS.to_string(),
            default_source: DEFAULT_SOURCE.to_string(),
        }
    }
}

impl ClientOptions {
    /// Options with every delay set to zero
    pub fn immediate() -> Self {
        Self::default()
            .with_status_update_delay(Duration::ZERO)
            .with_settle_delay(Duration::ZERO)
            .with_drag_release_delay(Duration::ZERO)
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the pre-update delay
    pub fn with_status_update_delay(mut self, value: Duration) -> Self {
        self.status_update_delay = value;
        self
    }

    /// Set the post-update settle delay
    pub fn with_settle_delay(mut self, value: Duration) -> Self {
        self.settle_delay = value;
        self
    }

    /// Set the drag release grace period
    pub fn with_drag_release_delay(mut self, value: Duration) -> Self {
        self.drag_release_delay = value;
        self
    }

    /// Set the default status of new leads
    pub fn with_default_status(mut self, value: &str) -> Self {
        self.default_status = value.to_string();
        self
    }

    /// Set the default source tag of new leads
    pub fn with_default_source(mut self, value: &str) -> Self {
        self.default_source = value.to_string();
        self
    }
}
