//! Kanban column management
//!
//! Leads reference their column by name, so renames are carried into the
//! leads table and deletes are guarded by a [`DeletePolicy`].

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::models::{Column, ColumnPatch, NewColumn};
use crate::notify::{Action, Notice, Notifier};
use crate::store::{ColumnStore, LeadStore};

/// What happens to the leads of a column being deleted
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Refuse while any lead sits in the column
    #[default]
    Block,
    /// Move the column's leads to another existing column first
    Reassign { to: String },
    /// Delete anyway; the leads show up as unassigned
    Orphan,
}

/// Create, rename, reorder and delete columns
pub struct ColumnOperations {
    columns: Arc<dyn ColumnStore>,
    leads: Arc<dyn LeadStore>,
    notifier: Arc<dyn Notifier>,
}

impl ColumnOperations {
    pub fn new(
        columns: Arc<dyn ColumnStore>,
        leads: Arc<dyn LeadStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            columns,
            leads,
            notifier,
        }
    }

    /// Columns in display order
    pub async fn list(&self) -> Result<Vec<Column>> {
        let mut columns = self.columns.fetch_all().await?;
        columns.sort_by_key(|c| c.position);
        Ok(columns)
    }

    /// Append a column at the end of the board
    pub async fn create(&self, name: &str) -> Result<Column> {
        let result = self.try_create(name).await;
        match &result {
            Ok(column) => self.notifier.notify(Notice::ColumnCreated {
                name: column.name.clone(),
            }),
            Err(e) => self.report(Action::CreateColumn, e),
        }
        result
    }

    async fn try_create(&self, name: &str) -> Result<Column> {
        let name = clean_name(name)?;
        let existing = self.list().await?;
        if existing.iter().any(|c| c.name == name) {
            return Err(Error::conflict(format!("a column named \"{}\" already exists", name)));
        }

        let position = existing.iter().map(|c| c.position + 1).max().unwrap_or(0);
        let column = self
            .columns
            .insert(&NewColumn {
                name: name.to_string(),
                position,
            })
            .await?;
        info!(column = %column.name, position, "column created");
        Ok(column)
    }

    /// Rename a column and carry its leads along. Returns how many leads
    /// were relabelled.
    pub async fn rename(&self, id: &str, new_name: &str) -> Result<usize> {
        let result = self.try_rename(id, new_name).await;
        match &result {
            Ok((from, to, leads)) if from != to => self.notifier.notify(Notice::ColumnRenamed {
                from: from.clone(),
                to: to.clone(),
                leads: *leads,
            }),
            Ok(_) => {}
            Err(e) => self.report(Action::RenameColumn, e),
        }
        result.map(|(_, _, leads)| leads)
    }

    async fn try_rename(&self, id: &str, new_name: &str) -> Result<(String, String, usize)> {
        let new_name = clean_name(new_name)?;
        let columns = self.list().await?;
        let column = find_column(&columns, id)?;
        if column.name == new_name {
            return Ok((column.name.clone(), new_name.to_string(), 0));
        }
        if columns.iter().any(|c| c.id != id && c.name == new_name) {
            return Err(Error::conflict(format!(
                "a column named \"{}\" already exists",
                new_name
            )));
        }

        self.columns
            .update(
                id,
                &ColumnPatch {
                    name: Some(new_name.to_string()),
                    position: None,
                },
            )
            .await?;

        // The leads did not move, so their column timer is left alone.
        let moved = match self
            .leads
            .reassign_status(&column.name, new_name, None)
            .await
        {
            Ok(moved) => moved,
            Err(e) => {
                warn!(column = %column.name, error = %e, "leads not relabelled, restoring column name");
                let restore = ColumnPatch {
                    name: Some(column.name.clone()),
                    position: None,
                };
                if let Err(undo) = self.columns.update(id, &restore).await {
                    error!(column = %column.name, error = %undo, "could not restore column name, its leads are unassigned");
                }
                return Err(e);
            }
        };
        info!(from = %column.name, to = %new_name, leads = moved, "column renamed");
        Ok((column.name.clone(), new_name.to_string(), moved))
    }

    /// Move a column to `index` and renumber positions densely. Only
    /// columns whose position changed are written.
    pub async fn reorder(&self, id: &str, index: usize) -> Result<Vec<Column>> {
        let result = self.try_reorder(id, index).await;
        match &result {
            Ok(_) => self.notifier.notify(Notice::ColumnsReordered),
            Err(e) => self.report(Action::ReorderColumns, e),
        }
        result
    }

    async fn try_reorder(&self, id: &str, index: usize) -> Result<Vec<Column>> {
        let mut columns = self.list().await?;
        let from = columns
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::not_found(format!("column {}", id)))?;

        let column = columns.remove(from);
        let to = index.min(columns.len());
        columns.insert(to, column);

        for (position, column) in columns.iter_mut().enumerate() {
            let position = position as i32;
            if column.position != position {
                self.columns
                    .update(
                        &column.id,
                        &ColumnPatch {
                            name: None,
                            position: Some(position),
                        },
                    )
                    .await?;
                column.position = position;
            }
        }
        Ok(columns)
    }

    /// Delete a column under `policy`. Returns how many leads were
    /// reassigned or left unassigned.
    pub async fn delete(&self, id: &str, policy: DeletePolicy) -> Result<usize> {
        let result = self.try_delete(id, &policy).await;
        match &result {
            Ok((name, _)) => self.notifier.notify(Notice::ColumnDeleted { name: name.clone() }),
            Err(e) => self.report(Action::DeleteColumn, e),
        }
        result.map(|(_, leads)| leads)
    }

    async fn try_delete(&self, id: &str, policy: &DeletePolicy) -> Result<(String, usize)> {
        let columns = self.list().await?;
        let column = find_column(&columns, id)?;
        let name = column.name.clone();

        let affected = match policy {
            DeletePolicy::Block => {
                let leads = self.leads.count_with_status(&name).await?;
                if leads > 0 {
                    return Err(Error::ColumnOccupied {
                        column: name,
                        leads,
                    });
                }
                0
            }
            DeletePolicy::Reassign { to } => {
                if to == &name || !columns.iter().any(|c| &c.name == to) {
                    return Err(Error::validation(format!(
                        "\"{}\" is not another column on this board",
                        to
                    )));
                }
                self.leads
                    .reassign_status(&name, to, Some(Utc::now()))
                    .await?
            }
            DeletePolicy::Orphan => {
                let leads = self.leads.count_with_status(&name).await?;
                if leads > 0 {
                    warn!(column = %name, leads, "deleting column, leads become unassigned");
                }
                leads
            }
        };

        self.columns.delete(id).await?;
        info!(column = %name, ?policy, affected, "column deleted");
        Ok((name, affected))
    }

    fn report(&self, action: Action, e: &Error) {
        warn!(?action, error = %e, "column operation failed");
        self.notifier.notify(Notice::failed(action, e.user_message()));
    }
}

fn clean_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("column name must not be empty"));
    }
    Ok(name)
}

fn find_column<'a>(columns: &'a [Column], id: &str) -> Result<&'a Column> {
    columns
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| Error::not_found(format!("column {}", id)))
}
