use crate::{auth, auth::AuthUser, backend::Services, config::Config, errors::ApiError};
use actix_web::{HttpResponse, http::header, web};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CredentialsReq {
    pub email: String,
    pub password: String,
}

impl CredentialsReq {
    fn validate(&self) -> Result<(), ApiError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::BadRequest("email and password are required".into()));
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct AuthResp {
    success: bool,
    user_id: Option<String>,
    confirmation_required: bool,
}

pub async fn login_page() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(include_str!("../../static/login.html"))
}

pub async fn index() -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/todos"))
        .finish()
}

pub async fn login(
    cfg: web::Data<Config>,
    services: web::Data<Services>,
    body: web::Json<CredentialsReq>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let session = services.auth.sign_in(body.email.trim(), &body.password).await?;
    log::info!("user {} signed in", session.user.id);

    let mut resp = HttpResponse::Ok();
    for cookie in auth::session_cookies(&session, cfg.secure_cookies) {
        resp.cookie(cookie);
    }
    Ok(resp.json(AuthResp {
        success: true,
        user_id: Some(session.user.id),
        confirmation_required: false,
    }))
}

pub async fn signup(
    cfg: web::Data<Config>,
    services: web::Data<Services>,
    body: web::Json<CredentialsReq>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let session = services.auth.sign_up(body.email.trim(), &body.password).await?;

    let Some(session) = session else {
        return Ok(HttpResponse::Ok().json(AuthResp {
            success: true,
            user_id: None,
            confirmation_required: true,
        }));
    };
    log::info!("user {} signed up", session.user.id);

    let mut resp = HttpResponse::Ok();
    for cookie in auth::session_cookies(&session, cfg.secure_cookies) {
        resp.cookie(cookie);
    }
    Ok(resp.json(AuthResp {
        success: true,
        user_id: Some(session.user.id),
        confirmation_required: false,
    }))
}

pub async fn logout(
    services: web::Data<Services>,
    user: Option<AuthUser>,
) -> HttpResponse {
    if let Some(user) = user {
        // the cookies go away regardless
        if let Err(e) = services.auth.sign_out(&user.access_token).await {
            log::warn!("remote sign out of {} failed: {e}", user.user_id);
        }
    }
    let mut resp = HttpResponse::Ok();
    for cookie in auth::cleared_cookies() {
        resp.cookie(cookie);
    }
    resp.json(serde_json::json!({ "success": true }))
}
