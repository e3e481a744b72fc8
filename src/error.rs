//! Error handling for the CRM core

use std::fmt;
use supabase_crm_postgrest::PostgrestError;
use thiserror::Error;

/// Unified error type for stores, lead operations and column operations
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),

    /// The referenced record is not in the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// A column still holds leads and the delete policy forbids removing it
    #[error("Column {column} still holds {leads} lead(s)")]
    ColumnOccupied { column: String, leads: usize },

    /// The write would break a uniqueness rule
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The lead store rejected the call or could not be reached
    #[error("Store error: {0}")]
    Store(#[from] PostgrestError),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new validation error
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    /// Create a new not-found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new conflict error
    pub fn conflict<T: fmt::Display>(msg: T) -> Self {
        Error::Conflict(msg.to_string())
    }

    /// Create a store error for failures that did not come from PostgREST
    pub fn store<T: fmt::Display>(msg: T) -> Self {
        Error::Store(PostgrestError::InvalidParameters(msg.to_string()))
    }

    /// Whether the error was raised before anything reached the store
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Whether the referenced record has vanished
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Reason shown to the user. Transport details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::NotFound(_) => "the record no longer exists".to_string(),
            Error::ColumnOccupied { column, leads } => {
                format!("column \"{}\" still holds {} lead(s)", column, leads)
            }
            Error::Conflict(msg) => msg.clone(),
            Error::Config(_) => "the client is not configured correctly".to_string(),
            Error::Store(_) | Error::Http(_) | Error::Url(_) | Error::Json(_) => {
                "the server could not complete the request".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
