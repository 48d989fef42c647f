//! Maps [`wkmp_common::Error`] onto HTTP responses per §7's error-kind
//! table. Grounded in the teacher's `wkmp-ap/src/error.rs` IntoResponse
//! pattern.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, info, warn};
use wkmp_common::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let message = self.0.to_string();

        match self.0 {
            Error::NotFound(_) => info!(%message, "not found"),
            Error::BadRequest(_) | Error::InvalidInput(_) => info!(%message, "bad request"),
            Error::ResourceExhausted(_) => warn!(%message, "resource exhausted"),
            Error::Transient(_) => warn!(%message, "transient failure"),
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Fatal(_) | Error::Internal(_) => {
                error!(%message, "fatal error")
            }
        }

        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
