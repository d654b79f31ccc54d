use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Query, Request};
use axum::http::{header, HeaderMap, Method, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use mqstore::context::ServerContext;
use mqstore::error::AuthError;

use crate::error::ApiError;

pub(crate) const TOKEN_HEADER: &str = "x-access-token";
const BODY_LIMIT: usize = 64 * 1024;

/// Username of the verified bearer token
#[derive(Debug, Clone)]
pub(crate) struct Actor(pub(crate) String);

#[derive(Debug, Default, Deserialize)]
struct TokenField {
    #[serde(default)]
    token: Option<String>,
}

#[inline]
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

/// Decode a JSON or urlencoded form body, `None` when it is neither
pub(crate) async fn body_fields<T: DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Option<T> {
    if body.is_empty() {
        return None;
    }
    if is_json(headers) {
        return serde_json::from_slice(body).ok();
    }
    let mut req = Request::new(Body::from(body.clone()));
    *req.method_mut() = Method::POST;
    *req.headers_mut() = headers.clone();
    Form::<T>::from_request(req, &()).await.ok().map(|Form(v)| v)
}

#[inline]
fn query_token(uri: &Uri) -> Option<String> {
    Query::<TokenField>::try_from_uri(uri).ok().and_then(|Query(f)| f.token)
}

#[inline]
fn header_token(headers: &HeaderMap) -> Option<String> {
    headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()).map(String::from)
}

/// Body field `token`, then query `token`, then the `x-access-token` header
pub(crate) async fn require_token(
    axum::extract::State(scx): axum::extract::State<ServerContext>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(body) => body,
        Err(e) => return (axum::http::StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
    };

    let token = body_fields::<TokenField>(&parts.headers, &body)
        .await
        .and_then(|f| f.token)
        .or_else(|| query_token(&parts.uri))
        .or_else(|| header_token(&parts.headers))
        .filter(|t| !t.is_empty());

    let token = match token {
        Some(token) => token,
        None => return ApiError::from(AuthError::MissingToken).into_response(),
    };

    let username = match scx.tokens.verify(&token) {
        Ok(username) => username,
        Err(e) => {
            log::debug!("token rejected, {}, path: {}", e, parts.uri.path());
            return ApiError::from(e).into_response();
        }
    };

    let mut req = Request::from_parts(parts, Body::from(body));
    req.extensions_mut().insert(Actor(username));
    next.run(req).await
}

pub(crate) async fn api_logger(req: Request, next: Next) -> Response {
    let log_data = format!("Request {:?}, {}, {}", req.version(), req.method(), req.uri().path());
    let resp = next.run(req).await;
    log::debug!("{}, status: {}", log_data, resp.status());
    resp
}
