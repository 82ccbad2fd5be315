use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::timeline::TimelineError;

const NO_SNAPSHOT_SUGGESTIONS: &[&str] = &[
    "Make sure the domain is spelled correctly",
    "Try with or without \"www\" prefix",
    "Check if the site exists in Web Archive manually",
    "Some newer sites may not have been archived yet",
];

/// Failures surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request body")]
    InvalidBody,
    #[error("Domain is required")]
    DomainRequired,
    #[error("No snapshots found in Web Archive")]
    NoSnapshots { domain: String },
    #[error("Not found")]
    NotFound,
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<TimelineError> for ApiError {
    fn from(e: TimelineError) -> Self {
        match e {
            TimelineError::EmptyDomain => ApiError::DomainRequired,
            TimelineError::NoSnapshots(domain) => ApiError::NoSnapshots { domain },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::InvalidBody | ApiError::DomainRequired => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            ApiError::NoSnapshots { domain } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": self.to_string(),
                    "message": format!(
                        "The domain \"{}\" has no archived snapshots. Try a different domain or check if it exists in https://web.archive.org",
                        domain
                    ),
                    "suggestions": NO_SNAPSHOT_SUGGESTIONS,
                }),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "Not found" })),
            ApiError::Internal(message) => {
                error!("Request failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error", "message": message }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_errors_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(TimelineError::EmptyDomain),
            ApiError::DomainRequired
        ));
        assert!(matches!(
            ApiError::from(TimelineError::NoSnapshots("a.com".into())),
            ApiError::NoSnapshots { domain } if domain == "a.com"
        ));
    }

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::InvalidBody.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::NoSnapshots { domain: "a.com".into() }.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
