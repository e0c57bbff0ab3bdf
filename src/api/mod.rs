// REST API for registration, login and the current principal

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AccessGate, AuthError, AuthService, CurrentUser, IssuedToken, access_gate};
use crate::model::{LoginRequest, PrincipalView, RegisterRequest};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuthService>,
    pub gate: Arc<AccessGate>,
}

/// Build the router. Every route, the fallback included, sits behind the
/// access gate.
pub fn create_router(state: AppState) -> Router {
    let gate = state.gate.clone();

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/me", get(me))
        .layer(middleware::from_fn_with_state(gate, access_gate))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PrincipalView>), AuthError> {
    let Json(request) = payload.map_err(invalid_body)?;
    let principal = state.service.register(request).await?;
    Ok((StatusCode::CREATED, Json(principal.view())))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<IssuedToken>, AuthError> {
    let Json(request) = payload.map_err(invalid_body)?;
    let issued = state.service.login(&request).await?;
    Ok(Json(issued))
}

async fn me(CurrentUser(ctx): CurrentUser) -> Json<Value> {
    Json(serde_json::json!({
        "id": ctx.principal_id(),
        "username": ctx.username(),
        "roles": ctx.roles(),
        "degraded": ctx.is_degraded(),
    }))
}

fn invalid_body(rejection: JsonRejection) -> AuthError {
    AuthError::InvalidRequest(rejection.body_text())
}
