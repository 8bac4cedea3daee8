use crate::backend::Services;
use crate::config::Config;
use crate::errors::ApiError;
use crate::models::user::{Session, UserInfo};
use actix_web::body::MessageBody;
use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{FromRequest, HttpMessage, HttpRequest, web};
use argon2::password_hash::{PasswordHash, SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use futures_util::future::{Ready, err, ok};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ACCESS_COOKIE: &str = "sb-access-token";
pub const REFRESH_COOKIE: &str = "sb-refresh-token";
const AUDIENCE: &str = "authenticated";
const REFRESH_COOKIE_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: usize,
}

pub fn hash_password(plain: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(hash: &str, plain: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn create_access_token(
    user: &UserInfo,
    secret: &[u8],
    ttl: Duration,
) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        aud: AUDIENCE.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Checks an HS256 token signed with the project's JWT secret.
pub fn verify_access_token(token: &str, secret: &[u8]) -> jsonwebtoken::errors::Result<Claims> {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.set_audience(&[AUDIENCE]);
    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret), &v)
        .map(|data| data.claims)
}

/// The signed-in caller, attached to the request by [`load_session`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
}

impl AuthUser {
    fn from_session(session: &Session) -> Self {
        Self {
            user_id: session.user.id.clone(),
            email: session.user.email.clone(),
            access_token: session.access_token.clone(),
        }
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthUser>() {
            Some(user) => ok(user.clone()),
            None => err(ApiError::Unauthorized),
        }
    }
}

/// Like [`AuthUser`], but sends anonymous visitors to the login page.
#[derive(Debug, Clone)]
pub struct PageUser(pub AuthUser);

impl FromRequest for PageUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthUser>() {
            Some(user) => ok(PageUser(user.clone())),
            None => err(ApiError::LoginRequired(format!(
                "/login?next={}",
                urlencoding::encode(req.path())
            ))),
        }
    }
}

pub fn session_cookies(session: &Session, secure: bool) -> [Cookie<'static>; 2] {
    let access = Cookie::build(ACCESS_COOKIE, session.access_token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(session.expires_in.max(0)))
        .finish();
    let refresh = Cookie::build(REFRESH_COOKIE, session.refresh_token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::days(REFRESH_COOKIE_DAYS))
        .finish();
    [access, refresh]
}

pub fn cleared_cookies() -> [Cookie<'static>; 2] {
    [ACCESS_COOKIE, REFRESH_COOKIE].map(|name| {
        let mut c = Cookie::build(name, "").path("/").finish();
        c.make_removal();
        c
    })
}

async fn verify_session(cfg: &Config, services: &Services, token: &str) -> Option<AuthUser> {
    if let Some(secret) = cfg.jwt_secret_bytes() {
        return match verify_access_token(token, secret) {
            Ok(claims) => Some(AuthUser {
                user_id: claims.sub,
                email: claims.email,
                access_token: token.to_string(),
            }),
            Err(e) => {
                log::debug!("access token rejected: {e}");
                None
            }
        };
    }
    match services.auth.user(token).await {
        Ok(user) => Some(AuthUser {
            user_id: user.id,
            email: user.email,
            access_token: token.to_string(),
        }),
        Err(e) => {
            log::debug!("access token rejected: {e}");
            None
        }
    }
}

/// Resolves the session cookies into an [`AuthUser`] request extension,
/// refreshing an expired session and writing the new cookies back.
pub async fn load_session(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let cfg = req.app_data::<web::Data<Config>>().cloned();
    let services = req.app_data::<web::Data<Services>>().cloned();
    let mut refreshed: Option<(Session, bool)> = None;

    if let (Some(cfg), Some(services)) = (cfg, services) {
        let access = req.cookie(ACCESS_COOKIE).map(|c| c.value().to_string());
        let refresh = req.cookie(REFRESH_COOKIE).map(|c| c.value().to_string());

        let mut user = match access.as_deref() {
            Some(token) if !token.is_empty() => verify_session(&cfg, &services, token).await,
            _ => None,
        };
        if user.is_none() {
            if let Some(refresh_token) = refresh.filter(|t| !t.is_empty()) {
                match services.auth.refresh(&refresh_token).await {
                    Ok(session) => {
                        log::debug!("refreshed session for {}", session.user.id);
                        user = Some(AuthUser::from_session(&session));
                        refreshed = Some((session, cfg.secure_cookies));
                    }
                    Err(e) => log::info!("session refresh failed: {e}"),
                }
            }
        }
        if let Some(user) = user {
            req.extensions_mut().insert(user);
        }
    }

    let mut res = next.call(req).await?;
    if let Some((session, secure)) = refreshed {
        let handler_set_cookies = res
            .response()
            .cookies()
            .any(|c| c.name() == ACCESS_COOKIE);
        if !handler_set_cookies {
            for cookie in session_cookies(&session, secure) {
                res.response_mut().add_cookie(&cookie)?;
            }
        }
    }
    Ok(res)
}
