//! Rows of the `leads` and `kanban_columns` tables and the payloads written to them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::error::{Error, Result};

/// A sales prospect tracked through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Name of the column the lead sits in
    pub status: String,
    #[serde(default)]
    pub status_changed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// When the lead entered its current column
    pub fn entered_column_at(&self) -> DateTime<Utc> {
        self.status_changed_at.unwrap_or(self.created_at)
    }
}

/// Fields of a lead about to be created, as entered by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewLead {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "email is not a valid address"))]
    pub email: String,
    #[validate(length(min = 10, max = 20, message = "phone must have between 10 and 20 characters"))]
    pub phone: String,
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
    pub notes: Option<String>,
    pub source: Option<String>,
}

impl NewLead {
    pub fn new(name: &str, email: &str, phone: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            status: crate::config::DEFAULT_STATUS.to_string(),
            notes: None,
            source: None,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("status", &self.status),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    /// Form-level checks: non-empty name and status, email shape, phone length
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|errors| {
            let mut messages: Vec<String> = errors
                .field_errors()
                .values()
                .flat_map(|errs| errs.iter())
                .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .collect();
            messages.sort();
            Error::validation(messages.join("; "))
        })
    }
}

/// Row written on insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadInsert {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: String,
    pub status_changed_at: DateTime<Utc>,
    pub source: String,
}

/// Fields a user may edit on an existing lead
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

impl LeadUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, value: &str) -> Self {
        self.name = Some(value.to_string());
        self
    }

    pub fn email(mut self, value: &str) -> Self {
        self.email = Some(value.to_string());
        self
    }

    pub fn phone(mut self, value: &str) -> Self {
        self.phone = Some(value.to_string());
        self
    }

    pub fn notes(mut self, value: &str) -> Self {
        self.notes = Some(value.to_string());
        self
    }

    pub fn status(mut self, value: &str) -> Self {
        self.status = Some(value.to_string());
        self
    }
}

/// Partial row sent with PATCH; unset fields are left alone by the store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeadPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_changed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LeadPatch {
    /// Status move stamped with `at`
    pub fn status_change(status: &str, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status.to_string()),
            status_changed_at: Some(at),
            updated_at: Some(at),
            ..Self::default()
        }
    }
}

/// A user-defined pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub name: String,
    pub position: i32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Row written when a column is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewColumn {
    pub name: String,
    pub position: i32,
}

/// Partial column row sent with PATCH
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

// Supabase tables use either uuid or bigint primary keys.
fn id_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}
