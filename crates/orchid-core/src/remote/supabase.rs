//! PostgREST remote store for Supabase projects

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::AccessTokenSource;
use crate::config::RemoteConfig;
use crate::error::Result;
use crate::models::EntityId;
use crate::util::compact_text;

use super::mapping::timestamp_to_remote;
use super::{RemoteError, RemoteResult, RemoteRow, RemoteStore};

const PAGE_SIZE: usize = 1_000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Remote store speaking PostgREST over HTTPS.
///
/// Requests carry the project's anon key as `apikey` and, when a token
/// source is attached, the user's access token as bearer. Row-level security
/// on the backend scopes what each user can read and write.
#[derive(Clone)]
pub struct SupabaseRestStore {
    rest_url: String,
    anon_key: String,
    client: Client,
    tokens: Option<Arc<dyn AccessTokenSource>>,
}

impl SupabaseRestStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(RemoteError::from)?;
        Ok(Self {
            rest_url: config.rest_url(),
            anon_key: config.anon_key.clone(),
            client,
            tokens: None,
        })
    }

    /// Authenticate requests with tokens from `tokens`, e.g. the connectivity monitor.
    #[must_use]
    pub fn with_token_source(mut self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn bearer_token(&self) -> String {
        self.tokens
            .as_ref()
            .and_then(|tokens| tokens.access_token())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer_token())
    }

    fn fetch_request(&self, table: &str, since: Option<&str>, offset: usize) -> RequestBuilder {
        let mut request = self
            .request(Method::GET, table)
            .header("Accept", "application/json")
            .query(&[("select", "*"), ("order", "updated_at.asc,id.asc")])
            .query(&[("limit", PAGE_SIZE), ("offset", offset)]);
        if let Some(since) = since {
            request = request.query(&[("updated_at", format!("gte.{since}"))]);
        }
        request
    }

    fn upsert_request(&self, table: &str, row: &RemoteRow) -> RequestBuilder {
        self.request(Method::POST, table)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(row)
    }

    fn delete_request(&self, table: &str, id: &EntityId) -> RequestBuilder {
        self.request(Method::DELETE, table)
            .query(&[("id", format!("eq.{id}"))])
    }
}

#[async_trait]
impl RemoteStore for SupabaseRestStore {
    async fn fetch_all(&self, table: &str, since: Option<i64>) -> RemoteResult<Vec<RemoteRow>> {
        let since = since.map(timestamp_to_remote).transpose()?;
        let mut rows = Vec::new();

        loop {
            let response = send(self.fetch_request(table, since.as_deref(), rows.len())).await?;
            let page: Vec<RemoteRow> = response.json().await?;
            let page_len = page.len();
            rows.extend(page);
            if page_len < PAGE_SIZE {
                break;
            }
        }

        tracing::debug!("GET {} returned {} rows", table, rows.len());
        Ok(rows)
    }

    async fn upsert(&self, table: &str, row: RemoteRow) -> RemoteResult<RemoteRow> {
        let id = row.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let response = send(self.upsert_request(table, &row)).await?;
        let mut stored: Vec<RemoteRow> = response.json().await?;

        // Row-level security hides rejected writes from the representation
        stored.pop().ok_or_else(|| {
            RemoteError::PermissionDenied(format!("{table} upsert of {id} returned no row"))
        })
    }

    async fn delete(&self, table: &str, id: &EntityId) -> RemoteResult<()> {
        send(self.delete_request(table, id)).await?;
        Ok(())
    }
}

async fn send(request: RequestBuilder) -> RemoteResult<Response> {
    let response = request.send().await?;
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(classify_api_error(status, &body))
}

#[derive(Debug, Default, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    error: Option<String>,
}

fn classify_api_error(status: StatusCode, body: &str) -> RemoteError {
    let payload = serde_json::from_str::<PostgrestErrorBody>(body).unwrap_or_default();
    let message = parse_api_error(status, &payload, body);

    match (status.as_u16(), payload.code.as_deref()) {
        (401, _) | (_, Some("PGRST301" | "PGRST302")) => RemoteError::Unauthorized(message),
        (403, _) | (_, Some("42501")) => RemoteError::PermissionDenied(message),
        (_, Some("PGRST204" | "PGRST102" | "42703" | "22P02" | "23502" | "42P01")) => {
            RemoteError::SchemaMismatch(message)
        }
        (408 | 429, _) => RemoteError::Transport(message),
        (status, _) => RemoteError::Api { status, message },
    }
}

fn parse_api_error(status: StatusCode, payload: &PostgrestErrorBody, body: &str) -> String {
    let message = payload
        .message
        .as_deref()
        .or(payload.error.as_deref())
        .map(str::trim)
        .filter(|message| !message.is_empty());

    if let Some(message) = message {
        let mut text = message.to_string();
        if let Some(details) = payload.details.as_deref().or(payload.hint.as_deref()) {
            text.push_str(": ");
            text.push_str(details.trim());
        }
        return format!("{} ({})", compact_text(&text), status.as_u16());
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::remote::ErrorClass;
    use pretty_assertions::assert_eq;

    fn store() -> SupabaseRestStore {
        let config = RemoteConfig::new("https://demo.supabase.co", "anon-key").unwrap();
        SupabaseRestStore::new(&config).unwrap()
    }

    fn header(request: &reqwest::Request, name: &str) -> String {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn fetch_request_pages_and_filters() {
        let request = store()
            .fetch_request("plants", Some("2024-01-01T00:00:00.000Z"), 1_000)
            .build()
            .unwrap();
        let url = request.url().as_str();
        assert!(url.starts_with("https://demo.supabase.co/rest/v1/plants?"));
        assert!(url.contains("select=*"));
        assert!(url.contains("order=updated_at.asc%2Cid.asc"));
        assert!(url.contains("limit=1000"));
        assert!(url.contains("offset=1000"));
        assert!(url.contains("updated_at=gte.2024-01-01T00%3A00%3A00.000Z"));
    }

    #[test]
    fn requests_fall_back_to_anon_key() {
        let request = store().fetch_request("plants", None, 0).build().unwrap();
        assert_eq!(header(&request, "apikey"), "anon-key");
        assert_eq!(header(&request, "authorization"), "Bearer anon-key");
        assert!(!request.url().as_str().contains("updated_at=gte"));
    }

    #[test]
    fn requests_use_session_token() {
        let store = store().with_token_source(Arc::new(StaticToken::new("user-jwt")));
        let id = EntityId::new();
        let request = store.delete_request("plants", &id).build().unwrap();
        assert_eq!(header(&request, "authorization"), "Bearer user-jwt");
        assert_eq!(request.method(), Method::DELETE);
        assert!(request.url().as_str().ends_with(&format!("id=eq.{id}")));
    }

    #[test]
    fn upsert_request_merges_duplicates() {
        let request = store()
            .upsert_request("plants", &RemoteRow::new())
            .build()
            .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert!(request.url().as_str().ends_with("on_conflict=id"));
        assert_eq!(
            header(&request, "prefer"),
            "resolution=merge-duplicates,return=representation"
        );
    }

    #[test]
    fn classify_api_error_maps_postgrest_codes() {
        let rls = classify_api_error(
            StatusCode::FORBIDDEN,
            r#"{"code":"42501","message":"new row violates row-level security policy"}"#,
        );
        assert_eq!(
            rls,
            RemoteError::PermissionDenied(
                "new row violates row-level security policy (403)".to_string()
            )
        );

        let expired = classify_api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"PGRST301","message":"JWT expired"}"#,
        );
        assert_eq!(expired.class(), ErrorClass::Authorization);

        let column = classify_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":"PGRST204","message":"Could not find the 'epithet' column","hint":null}"#,
        );
        assert_eq!(column.class(), ErrorClass::Schema);

        let outage = classify_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(
            outage,
            RemoteError::Api {
                status: 502,
                message: "HTTP 502".to_string()
            }
        );
        assert!(outage.is_transport());

        let throttled = classify_api_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(throttled, RemoteError::Transport("slow down (429)".to_string()));

        let conflict = classify_api_error(
            StatusCode::CONFLICT,
            r#"{"code":"23505","message":"duplicate key","details":"Key (id) exists"}"#,
        );
        assert_eq!(
            conflict,
            RemoteError::Api {
                status: 409,
                message: "duplicate key: Key (id) exists (409)".to_string()
            }
        );
    }
}
