use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use mqstore::context::ServerContext;
use mqstore::error::AuthError;
use mqstore::hook::ConnectInfo;
use mqstore::query::{self, Row};
use mqstore::topic::{decode_path_param, TopicPath};
use mqstore::Result;

use crate::error::ApiError;
use crate::extract::{api_logger, body_fields, require_token, Actor};

const HTTP_CLIENT_ID: &str = "http-api";

pub fn route(scx: ServerContext) -> Router {
    let topic_routes = Router::new()
        .route("/{topic}/{direction}/{count}/{unit}", post(relative_query))
        .route("/{topic}/from/{from}/to/{to}", post(absolute_query))
        .route("/{topic}/publish/{payload}", post(publish))
        .route_layer(middleware::from_fn_with_state(scx.clone(), require_token));

    Router::new()
        .route("/authenticate", post(authenticate))
        .merge(topic_routes)
        .layer(middleware::from_fn(api_logger))
        .with_state(scx)
}

pub async fn listen_and_serve(
    scx: ServerContext,
    laddr: SocketAddr,
    tls: bool,
    rx: oneshot::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(laddr).await?;
    log::info!("HTTP API Listening on {}, tls: {}", laddr, tls);
    if tls {
        let keys = scx.keys.clone();
        crate::tls::serve(listener, route(scx), keys, rx).await
    } else {
        axum::serve(listener, route(scx))
            .with_graceful_shutdown(async {
                rx.await.ok();
            })
            .await?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn authenticate(State(scx): State<ServerContext>, headers: HeaderMap, body: Bytes) -> Response {
    let creds = body_fields::<Credentials>(&headers, &body).await.unwrap_or_default();
    if !scx.registry.authenticate(&creds.username, &creds.password) {
        log::info!("authenticate denied, username: {}", creds.username);
        return ApiError::from(AuthError::BadCredentials).into_response();
    }
    match scx.tokens.issue(&creds.username) {
        Ok(token) => Json(json!({"success": true, "message": "Enjoy your token!", "token": token})).into_response(),
        Err(e) => {
            log::error!("issue token failure, username: {}, {:?}", creds.username, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"success": false, "message": "Authentication failed."})))
                .into_response()
        }
    }
}

/// Decode the path topic and apply the access rule for the token's user
fn authorize(scx: &ServerContext, actor: &Actor, topic: &str) -> std::result::Result<TopicPath, ApiError> {
    let topic = decode_path_param(topic);
    scx.registry.check(&actor.0, &topic).into_result().map_err(|e| {
        log::warn!("http query denied, username: {}, topic: {}, {}", actor.0, topic, e);
        e
    })?;
    Ok(TopicPath::parse(&topic)?)
}

/// Same rule as [`authorize`], answered by the bus publish hook
fn authorize_publish(scx: &ServerContext, actor: &Actor, topic: &str) -> std::result::Result<TopicPath, ApiError> {
    let topic = decode_path_param(topic);
    let connect_info = ConnectInfo::new(HTTP_CLIENT_ID, Some(&actor.0), None);
    scx.auth.message_publish_check_acl(&connect_info, &topic).into_result()?;
    Ok(TopicPath::parse(&topic)?)
}

async fn relative_query(
    State(scx): State<ServerContext>,
    Extension(actor): Extension<Actor>,
    Path((topic, direction, count, unit)): Path<(String, String, String, String)>,
) -> std::result::Result<Json<Vec<Row>>, ApiError> {
    let path = authorize(&scx, &actor, &topic)?;
    let query = query::relative(&path, &direction, &count, &unit, mqstore_utils::now_local())?;
    Ok(Json(scx.store.select(&query).await?))
}

async fn absolute_query(
    State(scx): State<ServerContext>,
    Extension(actor): Extension<Actor>,
    Path((topic, from, to)): Path<(String, String, String)>,
) -> std::result::Result<Json<Vec<Row>>, ApiError> {
    let path = authorize(&scx, &actor, &topic)?;
    let query = query::absolute(&path, &from, &to)?;
    Ok(Json(scx.store.select(&query).await?))
}

async fn publish(
    State(scx): State<ServerContext>,
    Extension(actor): Extension<Actor>,
    Path((topic, payload)): Path<(String, String)>,
) -> std::result::Result<Response, ApiError> {
    let path = authorize_publish(&scx, &actor, &topic)?;
    let bus = match scx.bus.as_ref() {
        Some(bus) => bus,
        None => return Ok(Json(json!({"status": "no broker configured"})).into_response()),
    };
    let topic = path.to_string();
    bus.publish(&topic, Bytes::from(payload.clone().into_bytes())).await.map_err(ApiError::Publish)?;
    Ok(Json(json!({"topic": topic, "payload": payload, "status": "published"})).into_response())
}
