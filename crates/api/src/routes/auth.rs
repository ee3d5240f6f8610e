//! Registration, login and the current account.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::AuthToken;
use serde::Deserialize;
use store::{Store, User};

use crate::error::ApiError;
use crate::extract::RequestCaller;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/register — create a shopper account.
#[tracing::instrument(skip(state, req))]
pub async fn register<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .auth
        .register(&req.email, &req.password, &req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /auth/login — exchange credentials for a bearer token.
#[tracing::instrument(skip(state, req))]
pub async fn login<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthToken>, ApiError> {
    Ok(Json(state.auth.login(&req.email, &req.password).await?))
}

/// GET /auth/me — the authenticated account.
#[tracing::instrument(skip(state))]
pub async fn me<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.auth.me(&caller).await?))
}
