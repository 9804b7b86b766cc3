use crate::errors::Error;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// Wraps [`Error`] so handlers can return it with `?`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(value: E) -> Self {
        Self(value.into())
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidRuleConfiguration { .. } | Error::InvalidAmount { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::UnauthorizedTrigger => StatusCode::UNAUTHORIZED,
            Error::RuleNotFound { .. } | Error::RateUnavailable { .. } => StatusCode::NOT_FOUND,
            Error::CursorConflict { .. } => StatusCode::CONFLICT,
            Error::ExchangeRate { .. } | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Config { .. }
            | Error::Database(_)
            | Error::Io(_)
            | Error::IntConversion(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
