//! Maps [`PlatformError`] onto the uniform JSON error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sim_ecs::error::PlatformError;

/// Newtype so this crate can implement [`IntoResponse`] for the shared error
/// type without violating the orphan rule.
pub struct ApiError(pub PlatformError);

impl From<PlatformError> for ApiError {
    fn from(err: PlatformError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: ErrorDetail { code: self.0.kind.code(), message: self.0.message },
        };
        (status, Json(body)).into_response()
    }
}

/// Shorthand alias used by every route handler.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sim_ecs::error::ErrorKind;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::from(PlatformError::not_found("no such node"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_maps_to_500() {
        let err = ApiError::from(PlatformError::new(ErrorKind::Internal, "boom"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
