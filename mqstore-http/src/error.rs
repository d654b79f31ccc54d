use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use mqstore::error::{AuthError, FormatError, MqstoreError};

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Format(FormatError),
    Store(MqstoreError),
    Publish(MqstoreError),
}

impl From<AuthError> for ApiError {
    #[inline]
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<FormatError> for ApiError {
    #[inline]
    fn from(e: FormatError) -> Self {
        ApiError::Format(e)
    }
}

impl From<MqstoreError> for ApiError {
    #[inline]
    fn from(e: MqstoreError) -> Self {
        match e {
            MqstoreError::Format(e) => ApiError::Format(e),
            MqstoreError::Auth(e) => ApiError::Auth(e),
            e => ApiError::Store(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(AuthError::BadCredentials) => {
                Json(json!({"success": false, "message": "Authentication failed."})).into_response()
            }
            ApiError::Auth(AuthError::MissingToken) => {
                (StatusCode::FORBIDDEN, Json(json!({"success": false, "message": "No token provided."})))
                    .into_response()
            }
            ApiError::Auth(AuthError::InvalidToken(_) | AuthError::TokenExpired) => {
                Json(json!({"success": false, "message": "Failed to authenticate token."})).into_response()
            }
            ApiError::Auth(AuthError::NotAuthorized(_)) => (
                StatusCode::FORBIDDEN,
                Json(json!({"success": false, "status": "unauthorized", "message": "Not authorized."})),
            )
                .into_response(),
            ApiError::Format(e) => {
                log::debug!("wrong request format, {}", e);
                Json(json!({"status": "wrong request format"})).into_response()
            }
            ApiError::Store(e) => {
                log::error!("store error, {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "store error"}))).into_response()
            }
            ApiError::Publish(e) => {
                log::error!("publish error, {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "publish error"}))).into_response()
            }
        }
    }
}
