use airyra_core::error::{DomainError, ErrorBody};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Result alias for HTTP handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Newtype that carries a [`DomainError`] across the axum boundary.
///
/// The response body is the wire error envelope; the status code comes from
/// the fixed code-to-status map on the domain error itself.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // the wire message is generic; keep the real cause in the log
            tracing::error!(error = ?self.0, "internal error serving request");
        }

        (status, Json(ErrorBody::from(self.0))).into_response()
    }
}
