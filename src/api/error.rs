//! Translation of failures into HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::summarize::SummarizeError;

/// Malformed or out-of-range input. Rejected before any task exists.
#[derive(Debug, thiserror::Error)]
#[error("Invalid input format")]
pub struct ValidationError(pub Vec<String>);

impl From<JsonRejection> for ValidationError {
    fn from(rejection: JsonRejection) -> Self {
        ValidationError(vec![rejection.body_text()])
    }
}

impl From<Vec<String>> for ValidationError {
    fn from(details: Vec<String>) -> Self {
        ValidationError(details)
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        tracing::warn!("Validation error: {:?}", self.0);
        let details: Vec<_> = self.0.iter().map(|msg| json!({ "msg": msg })).collect();
        let body = json!({ "message": self.to_string(), "details": details });
        (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
    }
}

/// Status an aggregated response carries for a failed task.
pub fn failure_status(error: &SummarizeError) -> StatusCode {
    match error {
        SummarizeError::ServiceUnavailable(_) | SummarizeError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SummarizeError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_failure_status() {
        assert_eq!(
            failure_status(&SummarizeError::ServiceUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            failure_status(&SummarizeError::Unexpected("bug".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_validation_body() {
        let response = ValidationError(vec!["bad".into()]).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Invalid input format");
        assert_eq!(body["details"][0]["msg"], "bad");
    }
}
