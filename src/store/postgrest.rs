use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use supabase_crm_postgrest::{PostgrestClient, SortOrder};

use super::{ColumnStore, LeadStore};
use crate::config::CrmConfig;
use crate::error::{Error, Result};
use crate::models::{Column, ColumnPatch, Lead, LeadInsert, LeadPatch, NewColumn};

/// Connection details shared by the table stores
#[derive(Debug, Clone)]
struct TableTarget {
    base_url: String,
    api_key: String,
    bearer: String,
    table: String,
    http_client: Client,
}

impl TableTarget {
    fn new(config: &CrmConfig, table: &str, http_client: Client) -> Self {
        Self {
            base_url: config.base_url(),
            api_key: config.anon_key.clone(),
            bearer: config.bearer_token().to_string(),
            table: table.to_string(),
            http_client,
        }
    }

    fn client(&self) -> Result<PostgrestClient> {
        let client = PostgrestClient::new(
            &self.base_url,
            &self.api_key,
            &self.table,
            self.http_client.clone(),
        )
        .with_auth(&self.bearer)?;
        Ok(client)
    }
}

/// [`LeadStore`] over Supabase's PostgREST endpoint
#[derive(Debug, Clone)]
pub struct PostgrestLeadStore {
    target: TableTarget,
}

impl PostgrestLeadStore {
    pub fn new(config: &CrmConfig, http_client: Client) -> Self {
        Self {
            target: TableTarget::new(config, &config.leads_table, http_client),
        }
    }
}

#[async_trait]
impl LeadStore for PostgrestLeadStore {
    async fn fetch_all(&self) -> Result<Vec<Lead>> {
        let leads = self
            .target
            .client()?
            .select("*")
            .order("created_at", SortOrder::Descending)
            .execute::<Lead>()
            .await?;
        Ok(leads)
    }

    async fn find(&self, id: &str) -> Result<Option<Lead>> {
        let lead = self
            .target
            .client()?
            .select("*")
            .eq("id", id)
            .execute_one::<Lead>()
            .await?;
        Ok(lead)
    }

    async fn insert(&self, lead: &LeadInsert) -> Result<Lead> {
        let rows: Vec<Lead> = self.target.client()?.insert(lead).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::store("insert returned no row"))
    }

    async fn update(&self, id: &str, patch: &LeadPatch) -> Result<()> {
        let rows: Vec<Value> = self.target.client()?.eq("id", id).update(patch).await?;
        if rows.is_empty() {
            return Err(Error::not_found(format!("lead {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let rows: Vec<Value> = self.target.client()?.eq("id", id).delete().await?;
        if rows.is_empty() {
            return Err(Error::not_found(format!("lead {}", id)));
        }
        Ok(())
    }

    async fn count_with_status(&self, status: &str) -> Result<usize> {
        let rows = self
            .target
            .client()?
            .select("id")
            .eq("status", status)
            .execute::<Value>()
            .await?;
        Ok(rows.len())
    }

    async fn reassign_status(
        &self,
        from: &str,
        to: &str,
        changed_at: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let patch = LeadPatch {
            status: Some(to.to_string()),
            status_changed_at: changed_at,
            updated_at: Some(Utc::now()),
            ..LeadPatch::default()
        };
        let rows: Vec<Value> = self
            .target
            .client()?
            .eq("status", from)
            .update(&patch)
            .await?;
        Ok(rows.len())
    }
}

/// [`ColumnStore`] over Supabase's PostgREST endpoint
#[derive(Debug, Clone)]
pub struct PostgrestColumnStore {
    target: TableTarget,
}

impl PostgrestColumnStore {
    pub fn new(config: &CrmConfig, http_client: Client) -> Self {
        Self {
            target: TableTarget::new(config, &config.columns_table, http_client),
        }
    }
}

#[async_trait]
impl ColumnStore for PostgrestColumnStore {
    async fn fetch_all(&self) -> Result<Vec<Column>> {
        let columns = self
            .target
            .client()?
            .select("*")
            .order("position", SortOrder::Ascending)
            .execute::<Column>()
            .await?;
        Ok(columns)
    }

    async fn insert(&self, column: &NewColumn) -> Result<Column> {
        let rows: Vec<Column> = self.target.client()?.insert(column).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::store("insert returned no row"))
    }

    async fn update(&self, id: &str, patch: &ColumnPatch) -> Result<()> {
        let rows: Vec<Value> = self.target.client()?.eq("id", id).update(patch).await?;
        if rows.is_empty() {
            return Err(Error::not_found(format!("column {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let rows: Vec<Value> = self.target.client()?.eq("id", id).delete().await?;
        if rows.is_empty() {
            return Err(Error::not_found(format!("column {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lead_row(id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "name": "Ana",
            "email": "ana@example.com",
            "phone": "11999990000",
            "notes": null,
            "status": status,
            "status_changed_at": "2024-03-01T12:00:00+00:00",
            "source": "manual",
            "created_at": "2024-03-01T11:00:00+00:00",
            "updated_at": null
        })
    }

    fn store_for(server: &MockServer) -> PostgrestLeadStore {
        let config = CrmConfig::new(&server.uri(), "anon-key")
            .unwrap()
            .with_access_token("user-jwt");
        PostgrestLeadStore::new(&config, Client::new())
    }

    #[tokio::test]
    async fn test_fetch_all_orders_newest_first() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/leads"))
            .and(query_param("select", "*"))
            .and(query_param("order", "created_at.desc"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([lead_row("L2", "Novo"), lead_row("L1", "Fechado")])),
            )
            .mount(&mock_server)
            .await;

        let leads = store_for(&mock_server).fetch_all().await.unwrap();

        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].id, "L2");
        assert_eq!(leads[1].status, "Fechado");
    }

    #[tokio::test]
    async fn test_find_missing_lead_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/leads"))
            .and(query_param("id", "eq.gone"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let found = store_for(&mock_server).find("gone").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_update_without_match_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/leads"))
            .and(query_param("id", "eq.gone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let err = store_for(&mock_server)
            .update("gone", &LeadPatch::status_change("Novo", Utc::now()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_insert_returns_stored_row() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/leads"))
            .and(header("Prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([lead_row("L9", "Novo")])))
            .mount(&mock_server)
            .await;

        let insert = LeadInsert {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            phone: "11999990000".to_string(),
            notes: None,
            status: "Novo".to_string(),
            status_changed_at: Utc::now(),
            source: "manual".to_string(),
        };
        let lead = store_for(&mock_server).insert(&insert).await.unwrap();
        assert_eq!(lead.id, "L9");
    }

    #[tokio::test]
    async fn test_reassign_status_filters_by_old_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/leads"))
            .and(query_param("status", "eq.Em Andamento"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                lead_row("L1", "Negociação"),
                lead_row("L2", "Negociação")
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let moved = store_for(&mock_server)
            .reassign_status("Em Andamento", "Negociação", None)
            .await
            .unwrap();
        assert_eq!(moved, 2);
    }

    #[tokio::test]
    async fn test_column_store_reads_by_position() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/kanban_columns"))
            .and(query_param("order", "position.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "name": "Novo", "position": 0, "created_at": null },
                { "id": 2, "name": "Em Andamento", "position": 1, "created_at": null }
            ])))
            .mount(&mock_server)
            .await;

        let config = CrmConfig::new(&mock_server.uri(), "anon-key").unwrap();
        let columns = PostgrestColumnStore::new(&config, Client::new())
            .fetch_all()
            .await
            .unwrap();

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].id, "2");
        assert_eq!(columns[1].name, "Em Andamento");
    }
}
