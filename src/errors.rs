use crate::backend::BackendError;
use actix_web::{HttpResponse, http::StatusCode, http::header, ResponseError};
use thiserror::Error;
use serde::Serialize;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("login required")]
    LoginRequired(String),
    #[error("operation failed: {0}")]
    Operation(String),
}

#[derive(Serialize)]
struct ApiErrBody {
    error: String
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::LoginRequired(_) => StatusCode::SEE_OTHER,
            ApiError::Operation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
    fn error_response(&self) -> HttpResponse {
        if let ApiError::LoginRequired(location) = self {
            return HttpResponse::SeeOther()
                .insert_header((header::LOCATION, location.as_str()))
                .finish();
        }
        HttpResponse::build(self.status_code()).json(ApiErrBody { error: self.to_string() })
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        log::error!("backend error: {e:?}");
        match e {
            BackendError::Unauthorized(_) => ApiError::Unauthorized,
            BackendError::Api { status, message } if (400..500).contains(&status) => {
                ApiError::BadRequest(message)
            }
            other => ApiError::Operation(other.to_string()),
        }
    }
}
