pub mod instances;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;

use crate::error::ApiError;
use crate::server::appstate::AppState;

/// Http-facing wrapper for [`ApiError`], rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct RouteError(ApiError);

pub type RouteResult<T> = Result<T, RouteError>;

impl From<ApiError> for RouteError {
    fn from(value: ApiError) -> Self {
        Self(value)
    }
}

impl RouteError {
    const fn status(&self) -> StatusCode {
        match &self.0 {
            ApiError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ReauthRequired(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotLoaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        } else {
            log::debug!("Request failed: {}", self.0);
        }

        let res = json!({"error": self.0.to_string()});

        (status, Json(res)).into_response()
    }
}

pub fn router() -> Router<AppState> {
    Router::new().nest("/instances", instances::router())
}
