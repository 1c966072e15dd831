use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::domain::order::{ErrorKind, OrderError};

// ============================================================================
// HTTP Error Mapping
// ============================================================================
//
// Every failure leaves the API as JSON `{error, message}`, with the status
// chosen by the error kind.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing or invalid identity: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Order(#[from] OrderError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Order(e) => e.code(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Order(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::InvalidTransition => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        // Storage details stay in the logs
        let message = match self {
            ApiError::Order(e) if e.kind() == ErrorKind::Internal => "Internal error".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(status).json(ErrorBody { error: self.code(), message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn test_statuses_follow_error_kind() {
        let cases = [
            (ApiError::from(OrderError::EmptyCart), StatusCode::BAD_REQUEST),
            (ApiError::from(OrderError::OrderNotFound(uuid::Uuid::nil())), StatusCode::NOT_FOUND),
            (ApiError::from(OrderError::Forbidden("nope")), StatusCode::FORBIDDEN),
            (ApiError::from(OrderError::AlreadyInTransit), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ApiError::from(OrderError::ConcurrencyConflict { expected: 1, actual: 2 }),
                StatusCode::CONFLICT,
            ),
            (ApiError::Unauthorized("missing X-User-Id".to_string()), StatusCode::UNAUTHORIZED),
        ];

        for (err, status) in cases {
            assert_eq!(err.status_code(), status);
        }
    }

    #[actix_web::test]
    async fn test_body_shape_and_hidden_storage_details() {
        let (status, body) = body_of(OrderError::AlreadyInTransit.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "already_in_transit");
        assert_eq!(body["message"], "Goods were already received at the depot");

        let (status, body) = body_of(OrderError::Storage(anyhow::anyhow!("node 10.0.0.3 down")).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal error");
    }
}
