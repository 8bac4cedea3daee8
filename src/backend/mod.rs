//! Seams to the hosted auth, table and storage services.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{BackendKind, Config};
use crate::models::file::StoredObject;
use crate::models::todo::{NewTodo, Todo};
use crate::models::user::{Session, UserInfo};

pub mod memory;
pub mod supabase;

pub use memory::MemoryBackend;
pub use supabase::SupabaseClient;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Called with `(bytes_sent, bytes_total)` while an upload body is consumed.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Options for [`ObjectStore::upload`].
#[derive(Clone, Default)]
pub struct UploadOptions {
    /// Overwrite an existing object with the same key.
    pub upsert: bool,
    pub cache_control: String,
    pub content_type: Option<String>,
    pub progress: Option<ProgressFn>,
}

/// Body chunk size used when reporting upload progress.
pub const UPLOAD_CHUNK: usize = 64 * 1024;

/// Password based accounts and their sessions.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// `None` when the account still has to confirm its e-mail address.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>>;

    async fn refresh(&self, refresh_token: &str) -> Result<Session>;

    async fn user(&self, access_token: &str) -> Result<UserInfo>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

/// The `todos` table. `token` is the caller's access token, `None` for
/// anonymous requests.
#[async_trait]
pub trait TodoTable: Send + Sync {
    /// All rows, newest `created_at` first.
    async fn list(&self, token: Option<&str>) -> Result<Vec<Todo>>;

    async fn insert(&self, token: Option<&str>, rows: &[NewTodo]) -> Result<()>;

    async fn set_completed(&self, token: Option<&str>, id: &str, completed: bool) -> Result<()>;

    async fn delete(&self, token: Option<&str>, id: &str) -> Result<()>;
}

/// The single drive bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object in the bucket.
    async fn list(&self, token: Option<&str>) -> Result<Vec<StoredObject>>;

    async fn upload(
        &self,
        token: Option<&str>,
        key: &str,
        data: Bytes,
        opts: UploadOptions,
    ) -> Result<()>;

    async fn remove(&self, token: Option<&str>, keys: &[String]) -> Result<()>;

    fn public_url(&self, key: &str) -> String;
}

/// Handles to the three services, shared as app data.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub todos: Arc<dyn TodoTable>,
    pub storage: Arc<dyn ObjectStore>,
}

impl Services {
    pub fn connect(cfg: &Config) -> Result<Self> {
        match cfg.backend {
            BackendKind::Supabase => {
                let client = Arc::new(SupabaseClient::new(cfg)?);
                Ok(Self::from_shared(client))
            }
            BackendKind::Memory => {
                let secret = cfg.jwt_secret.clone().unwrap_or_default();
                Ok(Self::from_shared(Arc::new(MemoryBackend::new(secret, &cfg.bucket))))
            }
        }
    }

    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: AuthService + TodoTable + ObjectStore + 'static,
    {
        Self {
            auth: backend.clone(),
            todos: backend.clone(),
            storage: backend,
        }
    }
}

/// Percentage of an upload handed to the transport, rounded.
pub fn progress_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds() {
        assert_eq!(progress_percent(0, 10), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(10, 10), 100);
    }

    #[test]
    fn empty_upload_is_complete() {
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[test]
    fn api_error_displays_service_message() {
        let err = BackendError::Api { status: 409, message: "The resource already exists".into() };
        assert_eq!(err.to_string(), "The resource already exists");
    }
}
