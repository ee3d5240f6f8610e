//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::InvalidArgument | ErrorKind::EmptyCart => StatusCode::BAD_REQUEST,
        ErrorKind::ProductUnavailable
        | ErrorKind::InsufficientStock
        | ErrorKind::InvalidState
        | ErrorKind::CheckoutBlocked
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": msg,
                    "kind": ErrorKind::InvalidArgument.as_str(),
                }),
            ),
            ApiError::Domain(err) => {
                let kind = err.kind();
                let message = if kind == ErrorKind::Internal {
                    tracing::error!(error = %err, "internal server error");
                    "internal server error".to_string()
                } else {
                    err.to_string()
                };
                let mut body = serde_json::json!({
                    "error": message,
                    "kind": kind.as_str(),
                });
                if let DomainError::CheckoutBlocked { issues } = &err {
                    body["issues"] = serde_json::json!(issues);
                }
                (status_for(kind), body)
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

#[cfg(test)]
mod tests {
    use store::StoreError;

    use super::*;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let err = ApiError::from(DomainError::from(StoreError::MissingRow {
            entity: "Order",
            id: 9,
        }));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body["error"], "internal server error");
        assert_eq!(body["kind"], "INTERNAL");
    }

    #[tokio::test]
    async fn checkout_blocked_carries_issues() {
        let err = ApiError::from(DomainError::CheckoutBlocked {
            issues: vec!["product 'Hammer' is no longer active".to_string()],
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_of(response).await;
        assert_eq!(body["kind"], "CHECKOUT_BLOCKED");
        assert_eq!(body["issues"][0], "product 'Hammer' is no longer active");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InsufficientStock), StatusCode::CONFLICT);
    }
}
