// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! QuickBooks Online API client.
//!
//! Handles:
//! - OAuth2 code exchange, refresh and revocation
//! - v3 accounting entity reads, queries, writes and deletes
//! - Fault parsing into `RemoteServiceError`
//! - Bounded retry for idempotent reads only

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, RemoteServiceError};
use crate::models::Credential;

/// Intuit OAuth2 consent page.
pub const AUTHORIZE_URL: &str = "https://appcenter.intuit.com/connect/oauth2";
const TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
const REVOKE_URL: &str = "https://developer.api.intuit.com/v2/oauth2/tokens/revoke";

/// Page size for `SELECT` queries (QuickBooks maximum).
const QUERY_PAGE_SIZE: usize = 1000;

/// Base delay between read retries; attempt `n` waits `n * RETRY_BACKOFF`.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Name-list entities cannot be hard-deleted; they are made inactive instead.
const SOFT_DELETE_TYPES: &[&str] = &["Customer", "Vendor", "Employee", "Item", "Account"];

/// Credentials for a single API call.
#[derive(Clone)]
pub struct ApiSession {
    pub access_token: String,
    pub realm_id: String,
}

impl From<&Credential> for ApiSession {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token.clone(),
            realm_id: credential.realm_id.clone(),
        }
    }
}

/// Tokens issued by a code exchange or refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    /// None when the provider kept the existing refresh token
    pub refresh_token: Option<String>,
    pub access_expires_in: Option<i64>,
    pub refresh_expires_in: Option<i64>,
}

/// An entity as returned by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub id: String,
    /// QuickBooks `SyncToken`
    pub version_token: Option<String>,
    /// The full entity object
    pub fields: Map<String, Value>,
}

impl RemoteEntity {
    /// Parse an entity object (`{"Id": ..., "SyncToken": ..., ...}`).
    pub fn from_object(fields: Map<String, Value>) -> Result<Self, RemoteServiceError> {
        let id = fields
            .get("Id")
            .and_then(value_as_string)
            .ok_or_else(|| RemoteServiceError::new(None, None, "Entity response missing Id"))?;
        let version_token = fields.get("SyncToken").and_then(value_as_string);
        Ok(Self {
            id,
            version_token,
            fields,
        })
    }
}

/// Company information for the connected realm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountMetadata {
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
}

/// The narrow surface of the accounting API the core depends on.
#[async_trait]
pub trait AccountingApi: Send + Sync {
    async fn exchange_code(&self, code: &str, realm_id: &str)
        -> Result<TokenPair, RemoteServiceError>;

    async fn refresh_token(
        &self,
        refresh_token: &str,
        realm_id: &str,
    ) -> Result<TokenPair, RemoteServiceError>;

    async fn revoke(&self, token: &str, realm_id: &str) -> Result<bool, RemoteServiceError>;

    /// `Ok(None)` when the entity does not exist.
    async fn fetch_entity(
        &self,
        session: &ApiSession,
        type_name: &str,
        remote_id: &str,
    ) -> Result<Option<RemoteEntity>, RemoteServiceError>;

    /// `filter` is a query `WHERE` clause body.
    async fn query_entities(
        &self,
        session: &ApiSession,
        type_name: &str,
        filter: Option<&str>,
    ) -> Result<Vec<RemoteEntity>, RemoteServiceError>;

    async fn create_entity(
        &self,
        session: &ApiSession,
        type_name: &str,
        payload: &Map<String, Value>,
    ) -> Result<RemoteEntity, RemoteServiceError>;

    async fn update_entity(
        &self,
        session: &ApiSession,
        type_name: &str,
        remote_id: &str,
        payload: &Map<String, Value>,
        version_token: &str,
    ) -> Result<RemoteEntity, RemoteServiceError>;

    async fn delete_entity(
        &self,
        session: &ApiSession,
        type_name: &str,
        remote_id: &str,
        version_token: &str,
    ) -> Result<bool, RemoteServiceError>;

    async fn fetch_account_metadata(
        &self,
        session: &ApiSession,
    ) -> Result<AccountMetadata, RemoteServiceError>;
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    x_refresh_token_expires_in: Option<i64>,
}

impl From<TokenResponse> for TokenPair {
    fn from(r: TokenResponse) -> Self {
        Self {
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            access_expires_in: r.expires_in,
            refresh_expires_in: r.x_refresh_token_expires_in,
        }
    }
}

/// reqwest-backed QuickBooks Online client.
#[derive(Clone)]
pub struct QboClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    revoke_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    minor_version: String,
    retry_attempts: u32,
    log_requests: bool,
}

impl QboClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.environment.api_base_url().to_string(),
            token_url: TOKEN_URL.to_string(),
            revoke_url: REVOKE_URL.to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            minor_version: config.minor_version.clone(),
            retry_attempts: config.api_retry_attempts.max(1),
            log_requests: config.log_requests,
        })
    }

    fn company_url(&self, realm_id: &str, path: &str) -> String {
        format!(
            "{}/v3/company/{}/{}",
            self.api_base,
            urlencoding::encode(realm_id),
            path
        )
    }

    fn log_request(&self, method: &str, url: &str) {
        if self.log_requests {
            tracing::debug!(method, url, "QuickBooks API request");
        }
    }

    /// Run an idempotent read, retrying transient failures.
    async fn with_retry<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, RemoteServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteServiceError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    tracing::warn!(op, attempt, error = %e, "Transient QuickBooks error, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenPair, RemoteServiceError> {
        self.log_request("POST", &self.token_url);
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| RemoteServiceError::transport(e.to_string()))?;

        let token: TokenResponse = check_response_json(response).await?;
        Ok(token.into())
    }

    async fn get_json(
        &self,
        session: &ApiSession,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, RemoteServiceError> {
        self.log_request("GET", url);
        let response = self
            .http
            .get(url)
            .bearer_auth(&session.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("minorversion", self.minor_version.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| RemoteServiceError::transport(e.to_string()))?;

        check_response_json(response).await
    }

    async fn post_json(
        &self,
        session: &ApiSession,
        url: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, RemoteServiceError> {
        self.log_request("POST", url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&session.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("minorversion", self.minor_version.as_str())])
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteServiceError::transport(e.to_string()))?;

        check_response_json(response).await
    }
}

#[async_trait]
impl AccountingApi for QboClient {
    async fn exchange_code(
        &self,
        code: &str,
        realm_id: &str,
    ) -> Result<TokenPair, RemoteServiceError> {
        tracing::debug!(realm_id, "Exchanging authorization code");
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
        realm_id: &str,
    ) -> Result<TokenPair, RemoteServiceError> {
        tracing::debug!(realm_id, "Refreshing access token");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn revoke(&self, token: &str, realm_id: &str) -> Result<bool, RemoteServiceError> {
        self.log_request("POST", &self.revoke_url);
        let response = self
            .http
            .post(&self.revoke_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| RemoteServiceError::transport(e.to_string()))?;

        check_response(response).await?;
        tracing::info!(realm_id, "QuickBooks token revoked");
        Ok(true)
    }

    async fn fetch_entity(
        &self,
        session: &ApiSession,
        type_name: &str,
        remote_id: &str,
    ) -> Result<Option<RemoteEntity>, RemoteServiceError> {
        let url = self.company_url(
            &session.realm_id,
            &format!("{}/{}", entity_path(type_name), urlencoding::encode(remote_id)),
        );

        let body = match self
            .with_retry("fetch_entity", || self.get_json(session, &url, &[]))
            .await
        {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        entity_from_envelope(body, type_name).map(Some)
    }

    async fn query_entities(
        &self,
        session: &ApiSession,
        type_name: &str,
        filter: Option<&str>,
    ) -> Result<Vec<RemoteEntity>, RemoteServiceError> {
        let url = self.company_url(&session.realm_id, "query");
        let mut entities = Vec::new();
        let mut start = 1;

        loop {
            let statement = select_statement(type_name, filter, start, QUERY_PAGE_SIZE);
            let params = [("query", statement.as_str())];
            let body = self
                .with_retry("query_entities", || self.get_json(session, &url, &params))
                .await?;

            let page = entities_from_query(body, type_name)?;
            let fetched = page.len();
            entities.extend(page);

            if fetched < QUERY_PAGE_SIZE {
                break;
            }
            start += QUERY_PAGE_SIZE;
        }

        tracing::debug!(type_name, count = entities.len(), "QuickBooks query complete");
        Ok(entities)
    }

    async fn create_entity(
        &self,
        session: &ApiSession,
        type_name: &str,
        payload: &Map<String, Value>,
    ) -> Result<RemoteEntity, RemoteServiceError> {
        let url = self.company_url(&session.realm_id, &entity_path(type_name));
        let body = self
            .post_json(session, &url, &[], &Value::Object(payload.clone()))
            .await?;
        entity_from_envelope(body, type_name)
    }

    async fn update_entity(
        &self,
        session: &ApiSession,
        type_name: &str,
        remote_id: &str,
        payload: &Map<String, Value>,
        version_token: &str,
    ) -> Result<RemoteEntity, RemoteServiceError> {
        let url = self.company_url(&session.realm_id, &entity_path(type_name));
        let mut body = payload.clone();
        body.insert("Id".to_string(), json!(remote_id));
        body.insert("SyncToken".to_string(), json!(version_token));
        body.insert("sparse".to_string(), json!(true));

        let response = self
            .post_json(session, &url, &[], &Value::Object(body))
            .await?;
        entity_from_envelope(response, type_name)
    }

    async fn delete_entity(
        &self,
        session: &ApiSession,
        type_name: &str,
        remote_id: &str,
        version_token: &str,
    ) -> Result<bool, RemoteServiceError> {
        let url = self.company_url(&session.realm_id, &entity_path(type_name));

        if SOFT_DELETE_TYPES.contains(&type_name) {
            let body = json!({
                "Id": remote_id,
                "SyncToken": version_token,
                "Active": false,
                "sparse": true,
            });
            self.post_json(session, &url, &[], &body).await?;
        } else {
            let body = json!({ "Id": remote_id, "SyncToken": version_token });
            self.post_json(session, &url, &[("operation", "delete")], &body)
                .await?;
        }

        tracing::info!(type_name, remote_id, "QuickBooks entity deleted");
        Ok(true)
    }

    async fn fetch_account_metadata(
        &self,
        session: &ApiSession,
    ) -> Result<AccountMetadata, RemoteServiceError> {
        let url = self.company_url(
            &session.realm_id,
            &format!("companyinfo/{}", urlencoding::encode(&session.realm_id)),
        );
        let body = self
            .with_retry("fetch_account_metadata", || self.get_json(session, &url, &[]))
            .await?;

        Ok(metadata_from_company_info(&body))
    }
}

// ─── Response Handling ───────────────────────────────────────────

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<(), RemoteServiceError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(parse_error(status, &body))
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, RemoteServiceError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(parse_error(status, &body));
    }

    let status = response.status().as_u16();
    response
        .json()
        .await
        .map_err(|e| RemoteServiceError::new(Some(status), None, format!("JSON parse error: {}", e)))
}

/// Turn a non-success response into a `RemoteServiceError`.
///
/// Understands both the accounting fault envelope and the OAuth error shape.
fn parse_error(status: u16, body: &str) -> RemoteServiceError {
    if status == 429 {
        tracing::warn!("QuickBooks rate limit hit (429)");
        return RemoteServiceError::new(
            Some(status),
            Some(RemoteServiceError::RATE_LIMITED.to_string()),
            "Rate limit exceeded",
        );
    }

    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if let Some(error) = parsed
        .as_ref()
        .and_then(|v| v.pointer("/Fault/Error/0"))
    {
        let message = error.get("Message").and_then(Value::as_str).unwrap_or("Fault");
        let detail = error.get("Detail").and_then(Value::as_str);
        let code = error.get("code").and_then(value_as_string);
        let text = match detail {
            Some(detail) => format!("{}: {}", message, detail),
            None => message.to_string(),
        };
        let code = if status == 401 {
            Some(RemoteServiceError::UNAUTHORIZED.to_string())
        } else {
            code
        };
        return RemoteServiceError::new(Some(status), code, text);
    }

    if let Some(error) = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
    {
        let description = parsed
            .as_ref()
            .and_then(|v| v.get("error_description"))
            .and_then(Value::as_str)
            .unwrap_or(error);
        return RemoteServiceError::new(Some(status), Some(error.to_string()), description);
    }

    let code = (status == 401).then(|| RemoteServiceError::UNAUTHORIZED.to_string());
    RemoteServiceError::new(Some(status), code, format!("HTTP {}: {}", status, body))
}

/// URL path segment for an entity type (`Customer` -> `customer`).
fn entity_path(type_name: &str) -> String {
    type_name.to_ascii_lowercase()
}

fn select_statement(type_name: &str, filter: Option<&str>, start: usize, max: usize) -> String {
    match filter {
        Some(filter) if !filter.trim().is_empty() => format!(
            "SELECT * FROM {} WHERE {} STARTPOSITION {} MAXRESULTS {}",
            type_name, filter, start, max
        ),
        _ => format!(
            "SELECT * FROM {} STARTPOSITION {} MAXRESULTS {}",
            type_name, start, max
        ),
    }
}

/// Extract `{"<Type>": {...}}` from a read/write response.
fn entity_from_envelope(body: Value, type_name: &str) -> Result<RemoteEntity, RemoteServiceError> {
    match body {
        Value::Object(mut envelope) => match envelope.remove(type_name) {
            Some(Value::Object(fields)) => RemoteEntity::from_object(fields),
            _ => Err(RemoteServiceError::new(
                None,
                None,
                format!("Response missing {} object", type_name),
            )),
        },
        _ => Err(RemoteServiceError::new(None, None, "Response is not an object")),
    }
}

/// Extract `QueryResponse.<Type>[]`. An empty result omits the array.
fn entities_from_query(body: Value, type_name: &str) -> Result<Vec<RemoteEntity>, RemoteServiceError> {
    let items = body
        .get("QueryResponse")
        .and_then(|qr| qr.get(type_name))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(fields) => Some(RemoteEntity::from_object(fields)),
            _ => None,
        })
        .collect()
}

fn metadata_from_company_info(body: &Value) -> AccountMetadata {
    let info = body.get("CompanyInfo");
    let text = |pointer: &str| {
        info.and_then(|i| i.pointer(pointer))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    AccountMetadata {
        company_name: text("/CompanyName"),
        email: text("/Email/Address"),
        country: text("/Country"),
    }
}

/// QuickBooks sends IDs as strings, but be lenient with numbers.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fault_envelope() {
        let body = r#"{"Fault":{"Error":[{"Message":"Duplicate Name Exists Error","Detail":"The name supplied already exists.","code":"6240"}],"type":"ValidationFault"}}"#;
        let err = parse_error(400, body);

        assert_eq!(err.status, Some(400));
        assert_eq!(err.code.as_deref(), Some("6240"));
        assert!(err.message.starts_with("Duplicate Name Exists Error"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_auth_and_rate_limit_errors() {
        let auth = parse_error(
            401,
            r#"{"Fault":{"Error":[{"Message":"AuthenticationFailed","code":"3200"}]}}"#,
        );
        assert_eq!(auth.code.as_deref(), Some(RemoteServiceError::UNAUTHORIZED));

        let limited = parse_error(429, "");
        assert_eq!(limited.code.as_deref(), Some(RemoteServiceError::RATE_LIMITED));
        assert!(limited.is_retryable());

        let grant = parse_error(400, r#"{"error":"invalid_grant"}"#);
        assert_eq!(grant.code.as_deref(), Some("invalid_grant"));
    }

    #[test]
    fn test_not_found_detection() {
        let fault = parse_error(
            400,
            r#"{"Fault":{"Error":[{"Message":"Object Not Found","code":"610"}]}}"#,
        );
        assert!(fault.is_not_found());
        assert!(RemoteServiceError::new(Some(404), None, "").is_not_found());
        assert!(!RemoteServiceError::new(Some(500), None, "").is_not_found());
    }

    #[test]
    fn test_select_statement() {
        assert_eq!(
            select_statement("Customer", None, 1, 1000),
            "SELECT * FROM Customer STARTPOSITION 1 MAXRESULTS 1000"
        );
        assert_eq!(
            select_statement("Invoice", Some("Id = '42'"), 1001, 1000),
            "SELECT * FROM Invoice WHERE Id = '42' STARTPOSITION 1001 MAXRESULTS 1000"
        );
    }

    #[test]
    fn test_entity_envelopes() {
        let body = json!({ "Customer": { "Id": "42", "SyncToken": "3", "DisplayName": "Acme" }, "time": "x" });
        let entity = entity_from_envelope(body, "Customer").unwrap();
        assert_eq!(entity.id, "42");
        assert_eq!(entity.version_token.as_deref(), Some("3"));
        assert_eq!(entity.fields["DisplayName"], "Acme");

        let query = json!({ "QueryResponse": { "Customer": [ { "Id": "1" }, { "Id": 2 } ] } });
        let ids: Vec<String> = entities_from_query(query, "Customer")
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);

        let empty = json!({ "QueryResponse": {} });
        assert!(entities_from_query(empty, "Customer").unwrap().is_empty());
    }

    #[test]
    fn test_company_info_metadata() {
        let body = json!({
            "CompanyInfo": { "CompanyName": "Acme", "Email": { "Address": "a@acme.test" }, "Country": "US" }
        });
        let meta = metadata_from_company_info(&body);
        assert_eq!(meta.company_name.as_deref(), Some("Acme"));
        assert_eq!(meta.email.as_deref(), Some("a@acme.test"));
    }
}
