// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! REST surface for swarm lifecycle and component config commands.
//!
//! Command handlers never wait for the swarm: they answer `202 Accepted` with
//! a correlation id and the topics on which the confirmation will appear.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::dispatcher::{
    CommandAccepted, CommandDispatcher, ConfigUpdateCommand, CreateSwarmCommand,
};
use crate::application::lifecycle::SwarmLifecycleService;
use crate::application::status_reconciler::{StatusReconciler, StatusView};
use crate::domain::errors::ControlPlaneError;
use crate::domain::lifecycle::SwarmRecord;
use crate::domain::repository::RepositoryError;
use crate::domain::scope::CommandTarget;

pub struct AppState {
    pub dispatcher: Arc<CommandDispatcher>,
    pub lifecycle: Arc<dyn SwarmLifecycleService>,
    pub reconciler: Arc<StatusReconciler>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/swarms", get(list_swarms))
        .route("/api/swarms/{swarm_id}", get(get_swarm))
        .route("/api/swarms/{swarm_id}/create", post(create_swarm))
        .route("/api/swarms/{swarm_id}/start", post(start_swarm))
        .route("/api/swarms/{swarm_id}/stop", post(stop_swarm))
        .route("/api/swarms/{swarm_id}/remove", post(remove_swarm))
        .route("/api/components/{role}/{instance}/config", post(update_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSwarmRequest {
    pub idempotency_key: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRequest {
    pub idempotency_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateRequest {
    pub idempotency_key: String,
    pub swarm_id: String,
    #[serde(default)]
    pub patch: Map<String, Value>,
    #[serde(default)]
    pub command_target: CommandTarget,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmResponse {
    pub swarm: SwarmRecord,
    pub status: Option<StatusView>,
}

/// JSON error body `{code, message, hint?}`.
pub struct ApiError(ControlPlaneError);

impl From<ControlPlaneError> for ApiError {
    fn from(value: ControlPlaneError) -> Self {
        Self(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ControlPlaneError::Validation(rejection.body_text()))
    }
}

/// Unwrap a JSON body, answering malformed or incomplete ones with `400`.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(value)| value).map_err(ApiError::from)
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ControlPlaneError::Validation(_)
            | ControlPlaneError::Routing(_)
            | ControlPlaneError::SchemaViolation(_) => StatusCode::BAD_REQUEST,
            ControlPlaneError::NotFound(_)
            | ControlPlaneError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ControlPlaneError::Conflict(_)
            | ControlPlaneError::Lifecycle(_)
            | ControlPlaneError::Repository(RepositoryError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ControlPlaneError::PublishFailure { .. } => StatusCode::BAD_GATEWAY,
            ControlPlaneError::DownstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ControlPlaneError::MissingBaseline(_) | ControlPlaneError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = self.0.code(), "Command failed: {}", self.0);
        }
        let mut body = json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
            "retryable": self.0.retryable(),
        });
        if let ControlPlaneError::DownstreamUnavailable { hint, .. } = &self.0 {
            body["hint"] = Value::String(hint.clone());
        }
        (status, Json(body)).into_response()
    }
}

type Accepted = Result<(StatusCode, Json<CommandAccepted>), ApiError>;

fn accepted(result: Result<CommandAccepted, ControlPlaneError>) -> Accepted {
    Ok((StatusCode::ACCEPTED, Json(result?)))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_swarms(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SwarmResponse>>, ApiError> {
    let swarms = state
        .lifecycle
        .list()
        .await?
        .into_iter()
        .map(|swarm| SwarmResponse {
            status: state.reconciler.view(&swarm.swarm_id),
            swarm,
        })
        .collect();
    Ok(Json(swarms))
}

async fn get_swarm(
    State(state): State<Arc<AppState>>,
    Path(swarm_id): Path<String>,
) -> Result<Json<SwarmResponse>, ApiError> {
    let swarm = state.lifecycle.get(&swarm_id).await?;
    Ok(Json(SwarmResponse {
        status: state.reconciler.view(&swarm_id),
        swarm,
    }))
}

async fn create_swarm(
    State(state): State<Arc<AppState>>,
    Path(swarm_id): Path<String>,
    payload: Result<Json<CreateSwarmRequest>, JsonRejection>,
) -> Accepted {
    let payload = body(payload)?;
    accepted(
        state
            .dispatcher
            .create_swarm(CreateSwarmCommand {
                swarm_id,
                idempotency_key: payload.idempotency_key,
                template_id: payload.template_id,
                template: payload.template,
            })
            .await,
    )
}

async fn start_swarm(
    State(state): State<Arc<AppState>>,
    Path(swarm_id): Path<String>,
    payload: Result<Json<LifecycleRequest>, JsonRejection>,
) -> Accepted {
    let payload = body(payload)?;
    accepted(
        state
            .dispatcher
            .start_swarm(&swarm_id, &payload.idempotency_key)
            .await,
    )
}

async fn stop_swarm(
    State(state): State<Arc<AppState>>,
    Path(swarm_id): Path<String>,
    payload: Result<Json<LifecycleRequest>, JsonRejection>,
) -> Accepted {
    let payload = body(payload)?;
    accepted(
        state
            .dispatcher
            .stop_swarm(&swarm_id, &payload.idempotency_key)
            .await,
    )
}

async fn remove_swarm(
    State(state): State<Arc<AppState>>,
    Path(swarm_id): Path<String>,
    payload: Result<Json<LifecycleRequest>, JsonRejection>,
) -> Accepted {
    let payload = body(payload)?;
    accepted(
        state
            .dispatcher
            .remove_swarm(&swarm_id, &payload.idempotency_key)
            .await,
    )
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Path((role, instance)): Path<(String, String)>,
    payload: Result<Json<ConfigUpdateRequest>, JsonRejection>,
) -> Accepted {
    let payload = body(payload)?;
    accepted(
        state
            .dispatcher
            .update_config(ConfigUpdateCommand {
                swarm_id: payload.swarm_id,
                role,
                instance,
                idempotency_key: payload.idempotency_key,
                patch: payload.patch,
                command_target: payload.command_target,
            })
            .await,
    )
}
