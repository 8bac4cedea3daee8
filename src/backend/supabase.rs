//! HTTP client for a Supabase project: GoTrue auth, PostgREST table and
//! Storage bucket.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use reqwest::{header, Body, Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    AuthService, BackendError, ObjectStore, Result, TodoTable, UploadOptions, UPLOAD_CHUNK,
};
use crate::config::Config;
use crate::models::file::StoredObject;
use crate::models::todo::{NewTodo, Todo};
use crate::models::user::{Session, UserInfo};

/// Page size used when walking a bucket listing.
const LIST_PAGE: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Session),
    User(UserInfo),
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

pub struct SupabaseClient {
    http: Client,
    base_url: String,
    api_key: String,
    table: String,
    bucket: String,
}

impl SupabaseClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("tododrive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: cfg.supabase_url.trim_end_matches('/').to_string(),
            api_key: cfg.supabase_key.clone(),
            table: cfg.todos_table.clone(),
            bucket: cfg.bucket.clone(),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, path)
    }

    /// Project key plus the caller's token, or the project key again for
    /// anonymous calls.
    fn authed(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", token.unwrap_or(&self.api_key)))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Network(format!("failed to {what}: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| format!("{what}: {status}"));
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
            StatusCode::NOT_FOUND => BackendError::NotFound(message),
            _ => BackendError::Api { status: status.as_u16(), message },
        })
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T> {
        self.send(request, what)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("failed to parse {what} response: {e}")))
    }
}

/// Pulls the human readable message out of a GoTrue, PostgREST or Storage
/// error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[async_trait]
impl AuthService for SupabaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let request = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password });
        self.send_json(self.authed(request, None), "sign in").await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let request = self
            .http
            .post(self.auth_url("signup"))
            .json(&Credentials { email, password });
        match self.send_json(self.authed(request, None), "sign up").await? {
            SignUpResponse::Session(session) => Ok(Some(session)),
            SignUpResponse::User(user) => {
                log::info!("sign up of {} awaits confirmation", user.id);
                Ok(None)
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let request = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        self.send_json(self.authed(request, None), "refresh session").await
    }

    async fn user(&self, access_token: &str) -> Result<UserInfo> {
        let request = self.http.get(self.auth_url("user"));
        self.send_json(self.authed(request, Some(access_token)), "get user").await
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let request = self.http.post(self.auth_url("logout"));
        self.send(self.authed(request, Some(access_token)), "sign out").await?;
        Ok(())
    }
}

#[async_trait]
impl TodoTable for SupabaseClient {
    async fn list(&self, token: Option<&str>) -> Result<Vec<Todo>> {
        let request = self
            .http
            .get(self.table_url())
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        self.send_json(self.authed(request, token), "select todos").await
    }

    async fn insert(&self, token: Option<&str>, rows: &[NewTodo]) -> Result<()> {
        let request = self
            .http
            .post(self.table_url())
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(self.authed(request, token), "insert todos").await?;
        Ok(())
    }

    async fn set_completed(&self, token: Option<&str>, id: &str, completed: bool) -> Result<()> {
        let request = self
            .http
            .patch(self.table_url())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "completed": completed }));
        self.send(self.authed(request, token), "update todo").await?;
        Ok(())
    }

    async fn delete(&self, token: Option<&str>, id: &str) -> Result<()> {
        let request = self
            .http
            .delete(self.table_url())
            .query(&[("id", format!("eq.{id}"))]);
        self.send(self.authed(request, token), "delete todo").await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for SupabaseClient {
    async fn list(&self, token: Option<&str>) -> Result<Vec<StoredObject>> {
        let url = self.storage_url(&format!("object/list/{}", self.bucket));
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let request = self.http.post(&url).json(&ListRequest {
                prefix: "",
                limit: LIST_PAGE,
                offset,
                sort_by: SortBy { column: "name", order: "asc" },
            });
            let page: Vec<StoredObject> =
                self.send_json(self.authed(request, token), "list files").await?;
            let fetched = page.len();
            all.extend(page);

            if fetched < LIST_PAGE {
                break;
            }
            offset += fetched;
        }

        Ok(all)
    }

    async fn upload(
        &self,
        token: Option<&str>,
        key: &str,
        data: Bytes,
        opts: UploadOptions,
    ) -> Result<()> {
        let url = self.storage_url(&format!("object/{}/{}", self.bucket, key));
        let total = data.len() as u64;
        let content_type = opts
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(UPLOAD_CHUNK)
            .map(|start| data.slice(start..(start + UPLOAD_CHUNK).min(data.len())))
            .collect();
        let progress = opts.progress.clone();
        let mut sent = 0u64;
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(report) = &progress {
                report(sent, total);
            }
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let request = self
            .http
            .post(url)
            .header("x-upsert", if opts.upsert { "true" } else { "false" })
            .header(header::CACHE_CONTROL, &opts.cache_control)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, total)
            .body(Body::wrap_stream(body));
        self.send(self.authed(request, token), "upload file").await?;

        if total == 0 {
            if let Some(report) = &opts.progress {
                report(0, 0);
            }
        }
        Ok(())
    }

    async fn remove(&self, token: Option<&str>, keys: &[String]) -> Result<()> {
        let request = self
            .http
            .delete(self.storage_url(&format!("object/{}", self.bucket)))
            .json(&serde_json::json!({ "prefixes": keys }));
        self.send(self.authed(request, token), "delete file").await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        self.storage_url(&format!("object/public/{}/{}", self.bucket, key))
    }
}
