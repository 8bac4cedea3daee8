//! In-process stand-in for the hosted services.
//!
//! Used by `backend = "memory"` for local development and by the tests.
//! Everything lives in maps and is lost on drop.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use super::{
    AuthService, BackendError, ObjectStore, Result, TodoTable, UploadOptions, UPLOAD_CHUNK,
};
use crate::auth;
use crate::models::file::{ObjectMetadata, StoredObject};
use crate::models::todo::{NewTodo, Todo};
use crate::models::user::{Session, UserInfo};

const SESSION_SECS: i64 = 3600;
const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    id: String,
    email: String,
    password_hash: String,
}

struct MemoryObject {
    id: String,
    data: Bytes,
    content_type: Option<String>,
    cache_control: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct MemoryBackend {
    secret: String,
    bucket: String,
    accounts: RwLock<HashMap<String, Account>>,
    refresh_tokens: RwLock<HashMap<String, String>>,
    todos: RwLock<Vec<Todo>>,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
}

impl MemoryBackend {
    pub fn new(secret: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            bucket: bucket.into(),
            accounts: RwLock::new(HashMap::new()),
            refresh_tokens: RwLock::new(HashMap::new()),
            todos: RwLock::new(Vec::new()),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    fn issue_session(&self, user: UserInfo) -> Result<Session> {
        let access_token = auth::create_access_token(
            &user,
            self.secret.as_bytes(),
            Duration::seconds(SESSION_SECS),
        )
        .map_err(|e| BackendError::Api { status: 500, message: format!("failed to sign token: {e}") })?;
        let refresh_token = Uuid::new_v4().simple().to_string();
        self.refresh_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(refresh_token.clone(), user.id.clone());

        Ok(Session {
            access_token,
            refresh_token,
            expires_in: SESSION_SECS,
            user,
        })
    }

    /// Row access for the todo table: signed-in callers only, like the
    /// `to authenticated` policy on the hosted table.
    fn authorize(&self, token: Option<&str>) -> Result<UserInfo> {
        let token = token.ok_or_else(|| {
            BackendError::Unauthorized("permission denied for table todos".into())
        })?;
        let claims = auth::verify_access_token(token, self.secret.as_bytes())
            .map_err(|e| BackendError::Unauthorized(format!("invalid JWT: {e}")))?;
        Ok(UserInfo { id: claims.sub, email: claims.email })
    }

    fn user_by_id(&self, id: &str) -> Option<UserInfo> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|a| a.id == id)
            .map(|a| UserInfo { id: a.id.clone(), email: Some(a.email.clone()) })
    }
}

#[async_trait]
impl AuthService for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let user = {
            let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
            accounts
                .get(&email.to_ascii_lowercase())
                .filter(|a| auth::verify_password(&a.password_hash, password))
                .map(|a| UserInfo { id: a.id.clone(), email: Some(a.email.clone()) })
        };
        match user {
            Some(user) => self.issue_session(user),
            None => Err(BackendError::Api {
                status: 400,
                message: "Invalid login credentials".into(),
            }),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(BackendError::Api {
                status: 422,
                message: format!("Password should be at least {MIN_PASSWORD_LEN} characters."),
            });
        }
        let password_hash = auth::hash_password(password).map_err(|e| BackendError::Api {
            status: 500,
            message: format!("failed to hash password: {e}"),
        })?;
        let key = email.to_ascii_lowercase();
        let user = {
            let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
            if accounts.contains_key(&key) {
                return Err(BackendError::Api {
                    status: 422,
                    message: "User already registered".into(),
                });
            }
            let account = Account { id: Uuid::new_v4().to_string(), email: key.clone(), password_hash };
            let user = UserInfo { id: account.id.clone(), email: Some(key.clone()) };
            accounts.insert(key, account);
            user
        };
        self.issue_session(user).map(Some)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let user_id = self
            .refresh_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(refresh_token)
            .ok_or_else(|| BackendError::Unauthorized("Invalid Refresh Token".into()))?;
        let user = self
            .user_by_id(&user_id)
            .ok_or_else(|| BackendError::Unauthorized("User not found".into()))?;
        self.issue_session(user)
    }

    async fn user(&self, access_token: &str) -> Result<UserInfo> {
        self.authorize(Some(access_token))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let user = self.user(access_token).await?;
        self.refresh_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, owner| *owner != user.id);
        Ok(())
    }
}

#[async_trait]
impl TodoTable for MemoryBackend {
    async fn list(&self, token: Option<&str>) -> Result<Vec<Todo>> {
        self.authorize(token)?;
        let mut rows = self.todos.read().unwrap_or_else(PoisonError::into_inner).clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, token: Option<&str>, rows: &[NewTodo]) -> Result<()> {
        self.authorize(token)?;
        let now = Utc::now();
        let mut todos = self.todos.write().unwrap_or_else(PoisonError::into_inner);
        todos.extend(rows.iter().map(|r| Todo {
            id: Uuid::new_v4().to_string(),
            title: r.title.clone(),
            completed: false,
            created_at: now,
            updated_at: now,
        }));
        Ok(())
    }

    async fn set_completed(&self, token: Option<&str>, id: &str, completed: bool) -> Result<()> {
        self.authorize(token)?;
        let mut todos = self.todos.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(todo) = todos.iter_mut().find(|t| t.id == id) {
            todo.completed = completed;
            todo.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, token: Option<&str>, id: &str) -> Result<()> {
        self.authorize(token)?;
        self.todos
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|t| t.id != id);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn list(&self, _token: Option<&str>) -> Result<Vec<StoredObject>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects
            .iter()
            .map(|(name, o)| StoredObject {
                name: name.clone(),
                id: Some(o.id.clone()),
                created_at: Some(o.created_at),
                updated_at: Some(o.updated_at),
                metadata: Some(ObjectMetadata {
                    size: Some(o.data.len() as u64),
                    mimetype: o.content_type.clone(),
                    cache_control: Some(o.cache_control.clone()),
                }),
            })
            .collect())
    }

    async fn upload(
        &self,
        _token: Option<&str>,
        key: &str,
        data: Bytes,
        opts: UploadOptions,
    ) -> Result<()> {
        let total = data.len() as u64;
        if let Some(report) = &opts.progress {
            let mut sent = 0u64;
            for chunk in data.chunks(UPLOAD_CHUNK) {
                sent += chunk.len() as u64;
                report(sent, total);
            }
            if total == 0 {
                report(0, 0);
            }
        }

        let now = Utc::now();
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let created_at = match objects.get(key) {
            Some(_) if !opts.upsert => {
                return Err(BackendError::Api {
                    status: 409,
                    message: "The resource already exists".into(),
                })
            }
            Some(existing) => existing.created_at,
            None => now,
        };
        objects.insert(
            key.to_string(),
            MemoryObject {
                id: Uuid::new_v4().to_string(),
                data,
                content_type: opts.content_type,
                cache_control: opts.cache_control,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn remove(&self, _token: Option<&str>, keys: &[String]) -> Result<()> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }
}
