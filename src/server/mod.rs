//! Thin HTTP boundary layer.
//!
//! Every route is the same shape: extract the bearer credential, verify it
//! through the gateway, call one core operation, map the typed outcome to
//! a status code. No domain logic lives here.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::AuthVerifier;
use crate::domain::{InstanceId, InstanceSnapshot, OwnerId};
use crate::error::Error;
use crate::lifecycle::LifecycleController;
use crate::streamer::StatusStreamer;

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleController>,
    pub streamer: Arc<StatusStreamer>,
    pub verifier: Arc<dyn AuthVerifier>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/api", post(create_instance).get(list_instances))
        .route("/api/images", get(list_images))
        .route("/api/:instance_id", delete(delete_instance))
        .route("/api/verify/:instance_id", get(verify_instance))
        .route("/api/ws", get(live_feed))
        .with_state(state)
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::InvalidImage(_) => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Transient(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        // Infrastructure detail stays out of response bodies.
        let body = match &self {
            Error::Transient(_) | Error::Internal(_) | Error::Config(_) => {
                warn!(error = %self, "request failed");
                String::new()
            }
            client_visible => client_visible.to_string(),
        };
        (status, body).into_response()
    }
}

/// Resolve the calling owner, or fail with `Unauthenticated`.
///
/// The bearer credential comes from the `Authorization` header, with an
/// `access_token` cookie fallback for the reverse-proxy verification hop.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<OwnerId, Error> {
    let bearer = bearer_token(headers).ok_or(Error::Unauthenticated)?;
    state.verifier.verify(&bearer).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    let cookies = headers.get("cookie")?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "access_token").then(|| value.to_string())
    })
}

async fn healthcheck() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    image: String,
    #[serde(default = "default_display_name")]
    name: String,
}

fn default_display_name() -> String {
    "a_notebook".to_string()
}

async fn create_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRequest>,
) -> Result<Json<InstanceSnapshot>, Error> {
    let owner = authenticate(&state, &headers).await?;
    let instance = state
        .lifecycle
        .create_instance(&owner, &request.image, &request.name)
        .await?;
    Ok(Json(instance.snapshot()))
}

async fn list_instances(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<InstanceSnapshot>>, Error> {
    let owner = authenticate(&state, &headers).await?;
    let instances = state.lifecycle.list_instances(&owner).await?;
    Ok(Json(instances.iter().map(|i| i.snapshot()).collect()))
}

/// Short image names the caller may request on creation.
async fn list_images(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, Error> {
    authenticate(&state, &headers).await?;
    let mut names = state.lifecycle.image_names();
    names.sort();
    Ok(Json(names))
}

async fn delete_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(instance_id): Path<String>,
) -> Result<StatusCode, Error> {
    let owner = authenticate(&state, &headers).await?;
    state
        .lifecycle
        .delete_instance(&owner, &InstanceId::new(instance_id))
        .await?;
    Ok(StatusCode::OK)
}

async fn verify_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(instance_id): Path<String>,
) -> Result<StatusCode, Error> {
    let owner = authenticate(&state, &headers).await?;
    state
        .lifecycle
        .verify_ownership(&owner, &InstanceId::new(instance_id))
        .await
        .map_err(|err| match err {
            // The gate reports only pass/fail; neither foreign ownership
            // nor nonexistence is distinguishable from a bad credential.
            Error::Forbidden | Error::NotFound => Error::Unauthenticated,
            other => other,
        })?;
    Ok(StatusCode::OK)
}

async fn live_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let owner = match authenticate(&state, &headers).await {
        Ok(owner) => owner,
        Err(err) => return err.into_response(),
    };
    ws.on_upgrade(move |socket| stream_events(socket, state, owner))
}

/// Pump one subscription into one socket until either side closes.
async fn stream_events(mut socket: WebSocket, state: AppState, owner: OwnerId) {
    let mut subscription = match state.streamer.subscribe(&owner).await {
        Ok(subscription) => subscription,
        Err(err) => {
            debug!(owner = %owner, error = %err, "subscription failed to open");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            event = subscription.next_event() => {
                let event = match event {
                    Some(Ok(event)) => event,
                    Some(Err(err)) => {
                        debug!(owner = %owner, error = %err, "watch failed, closing feed");
                        break;
                    }
                    None => break,
                };
                let Ok(json) = serde_json::to_string(&event) else {
                    break;
                };
                // A failed write means the subscriber is gone.
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    // Dropping the subscription closes the underlying watch immediately.
}
