//! PostgREST client for the Supabase CRM
//!
//! A small request builder over Supabase's `/rest/v1/<table>` endpoint,
//! covering the calls the CRM needs against its `leads` and
//! `kanban_columns` tables.
//!
//! # Features
//!
//! - Query API (`select`, `insert`, `update`, `delete`)
//! - Equality filters (`eq`)
//! - Ordering and limits
//! - Typed API errors parsed from PostgREST error bodies

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Details of an error returned by the PostgREST API
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Errors produced by [`PostgrestClient`]
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: reqwest::StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError {
        message: String,
        status: reqwest::StatusCode,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// HTTP status of the failed call, when the server answered at all
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            PostgrestError::ApiError { status, .. }
            | PostgrestError::UnparsedApiError { status, .. } => Some(*status),
            PostgrestError::NetworkError(e) => e.status(),
            _ => None,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// PostgREST client bound to one table
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: HashMap<String, String>,
}

impl PostgrestClient {
    /// Create a client for `table` under the project at `base_url`
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: HashMap::new(),
        }
    }

    /// Name of the table this client targets
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add a request header
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Authorize requests with a bearer token (anon key or user access token)
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// Columns to return
    pub fn select(mut self, columns: &str) -> Self {
        self.query_params
            .insert("select".to_string(), columns.to_string());
        self
    }

    /// Equality filter
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("eq.{}", value));
        self
    }

    /// Sort order of the result
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        self.query_params
            .insert("order".to_string(), format!("{}.{}", column, order.as_str()));
        self
    }

    /// Maximum number of rows
    pub fn limit(mut self, count: usize) -> Self {
        self.query_params
            .insert("limit".to_string(), count.to_string());
        self
    }

    /// Fetch rows
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let url = self.build_url()?;
        log::debug!("GET {}", url);

        let request = self.http_client.get(&url).headers(self.headers.clone());
        let body = self.send(request).await?;
        parse_rows(&body)
    }

    /// Fetch at most one row
    pub async fn execute_one<T: DeserializeOwned>(&self) -> Result<Option<T>, PostgrestError> {
        let rows = self.clone().limit(1).execute::<T>().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert rows and return their stored representation
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        let url = self.build_url()?;
        log::debug!("POST {}", url);

        let request = self
            .http_client
            .post(&url)
            .headers(self.representation_headers())
            .json(values);
        let body = self.send(request).await?;
        parse_rows(&body)
    }

    /// Update the rows matched by the current filters
    pub async fn update<T: Serialize, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        self.require_filter("update")?;
        let url = self.build_url()?;
        log::debug!("PATCH {}", url);

        let request = self
            .http_client
            .patch(&url)
            .headers(self.representation_headers())
            .json(values);
        let body = self.send(request).await?;
        parse_rows(&body)
    }

    /// Delete the rows matched by the current filters
    pub async fn delete<R: DeserializeOwned>(&self) -> Result<Vec<R>, PostgrestError> {
        self.require_filter("delete")?;
        let url = self.build_url()?;
        log::debug!("DELETE {}", url);

        let request = self
            .http_client
            .delete(&url)
            .headers(self.representation_headers());
        let body = self.send(request).await?;
        parse_rows(&body)
    }

    fn representation_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );
        headers
    }

    // An unfiltered PATCH or DELETE would touch the whole table.
    fn require_filter(&self, operation: &str) -> Result<(), PostgrestError> {
        let filtered = self
            .query_params
            .keys()
            .any(|key| !matches!(key.as_str(), "select" | "order" | "limit"));
        if filtered {
            Ok(())
        } else {
            Err(PostgrestError::InvalidParameters(format!(
                "Refusing to {} without a filter on table {}",
                operation, self.table
            )))
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, PostgrestError> {
        let response = request.send().await.map_err(PostgrestError::NetworkError)?;
        let status = response.status();

        if status.is_success() {
            return response.text().await.map_err(|e| {
                PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
            });
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
            Ok(details) => Err(PostgrestError::ApiError { details, status }),
            Err(_) => Err(PostgrestError::UnparsedApiError {
                message: error_text,
                status,
            }),
        }
    }

    fn build_url(&self) -> Result<String, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;

        for (key, value) in &self.query_params {
            url.query_pairs_mut().append_pair(key, value);
        }

        Ok(url.to_string())
    }
}

// `return=minimal` and 204 responses come back empty.
fn parse_rows<R: DeserializeOwned>(body: &str) -> Result<Vec<R>, PostgrestError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<R>>(body)
        .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PostgrestClient {
        PostgrestClient::new(&server.uri(), "fake-key", "leads", Client::new())
    }

    #[tokio::test]
    async fn test_select_with_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/leads"))
            .and(query_param("select", "*"))
            .and(query_param("order", "created_at.desc"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "L2", "name": "Bruna" },
                { "id": "L1", "name": "Ana" }
            ])))
            .mount(&mock_server)
            .await;

        let rows = client_for(&mock_server)
            .select("*")
            .order("created_at", SortOrder::Descending)
            .execute::<Value>()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], "L2");
    }

    #[tokio::test]
    async fn test_execute_one_sends_limit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/leads"))
            .and(query_param("id", "eq.L1"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let row = client_for(&mock_server)
            .select("*")
            .eq("id", "L1")
            .execute_one::<Value>()
            .await
            .unwrap();

        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_insert() {
        let mock_server = MockServer::start().await;
        let payload = json!({ "name": "Ana", "status": "Novo" });

        Mock::given(method("POST"))
            .and(path("/rest/v1/leads"))
            .and(header("Prefer", "return=representation"))
            .and(header("content-type", "application/json"))
            .and(body_json(&payload))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([{ "id": "L1", "name": "Ana", "status": "Novo" }])),
            )
            .mount(&mock_server)
            .await;

        let rows: Vec<Value> = client_for(&mock_server).insert(&payload).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "L1");
    }

    #[tokio::test]
    async fn test_update_with_filter() {
        let mock_server = MockServer::start().await;
        let payload = json!({ "status": "Em Andamento" });

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/leads"))
            .and(query_param("id", "eq.L1"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "L1", "status": "Em Andamento" }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rows: Vec<Value> = client_for(&mock_server)
            .eq("id", "L1")
            .update(&payload)
            .await
            .unwrap();

        assert_eq!(rows[0]["status"], "Em Andamento");
    }

    #[tokio::test]
    async fn test_update_without_filter_is_rejected() {
        let mock_server = MockServer::start().await;

        let result: Result<Vec<Value>, _> = client_for(&mock_server)
            .update(&json!({ "status": "Novo" }))
            .await;

        assert!(matches!(result, Err(PostgrestError::InvalidParameters(_))));
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_no_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/leads"))
            .and(query_param("id", "eq.L3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let rows: Vec<Value> = client_for(&mock_server)
            .eq("id", "L3")
            .delete()
            .await
            .unwrap();

        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_api_error_is_parsed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/leads"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "PGRST301",
                "message": "JWT expired",
                "details": null,
                "hint": null
            })))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .select("*")
            .execute::<Value>()
            .await
            .unwrap_err();

        match &err {
            PostgrestError::ApiError { details, status } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(details.code.as_deref(), Some("PGRST301"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.status().map(|s| s.as_u16()), Some(401));
    }

    #[tokio::test]
    async fn test_unparsed_error_keeps_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/leads"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .select("*")
            .execute::<Value>()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PostgrestError::UnparsedApiError { ref message, .. } if message == "Bad Gateway"
        ));
    }

    #[test]
    fn test_error_details_display() {
        let details = PostgrestApiErrorDetails {
            code: Some("23505".to_string()),
            message: Some("duplicate key".to_string()),
            details: None,
            hint: Some("use another name".to_string()),
        };
        assert_eq!(
            details.to_string(),
            "Code: 23505, Message: duplicate key, Hint: use another name"
        );
    }
}
