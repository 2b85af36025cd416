//! JSON body extractor for the v1 routes
//!
//! Wraps `axum::Json` so that every rejected body comes back in the `{"error": {...}}`
//! format. A body that parses but has the wrong shape is reported exactly like a
//! definition that fails validation (`validation_failed`), so clients handle a single
//! error shape whether the problem was caught by serde or by the workflow validator.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json as AxumJson,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::error::{ApiError, ApiErrorType};
use crate::domain::workflow::WorkflowError;

/// JSON request body / response payload
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match AxumJson::<T>::from_request(req, state).await {
            Ok(AxumJson(value)) => Ok(Json(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "Rejected request body");
                Err(body_error(rejection))
            }
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}

fn body_error(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            WorkflowError::validation(shape_message(&err.body_text())).into()
        }
        JsonRejection::JsonSyntaxError(err) => {
            ApiError::bad_request(format!("Request body is not valid JSON: {}", detail(&err.body_text())))
                .with_code("invalid_json")
        }
        JsonRejection::MissingJsonContentType(_) => ApiError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiErrorType::InvalidRequestError,
            "Expected 'Content-Type: application/json'",
        )
        .with_code("unsupported_media_type"),
        other => ApiError::new(other.status(), ApiErrorType::InvalidRequestError, other.body_text())
            .with_code("invalid_body"),
    }
}

/// serde's message minus axum's generic prefix
fn detail(body_text: &str) -> &str {
    body_text
        .split_once(": ")
        .map(|(_, rest)| rest)
        .unwrap_or(body_text)
}

fn shape_message(body_text: &str) -> String {
    format!("Invalid request body: {}", detail(body_text))
}
