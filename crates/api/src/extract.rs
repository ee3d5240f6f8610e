//! Caller identity extraction.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::SessionId;
use domain::{Caller, DomainError};
use store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the anonymous session id of a guest.
pub const SESSION_HEADER: &str = "x-session-id";

/// The caller of a request, built from `Authorization: Bearer <token>` and
/// `X-Session-Id`. Both are optional; a bad token is rejected with 401.
#[derive(Debug, Clone)]
pub struct RequestCaller(pub Caller);

impl<S: Store + 'static> FromRequestParts<Arc<AppState<S>>> for RequestCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let mut caller = Caller::anonymous();

        if let Some(value) = parts.headers.get(AUTHORIZATION) {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    DomainError::Unauthorized("expected a bearer token".to_string())
                })?;
            caller.principal = Some(state.auth.resolve(token)?);
        }

        if let Some(value) = parts.headers.get(SESSION_HEADER) {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("malformed session id".to_string()))?;
            caller.session_id = SessionId::new(raw);
        }

        Ok(RequestCaller(caller))
    }
}
