use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;
use crate::RecordId;

/// Every failure a handler can report, each mapped to one HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    /// The addressed record does not exist.
    #[error("{entity} not found")]
    NotFound {
        /// Kind of record, e.g. `"User"`.
        entity: &'static str,
        /// Id that was looked up.
        id: RecordId,
    },

    /// The request is malformed: bad query parameter, path id or body.
    #[error("{0}")]
    Validation(String),

    /// The store failed. Details are logged, not returned.
    #[error("Internal server error")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => AppError::NotFound { entity, id },
            StoreError::Db(err) => AppError::StoreUnavailable(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::StoreUnavailable(err) = &self {
            error!("Store error while serving request: {err:#}");
        }
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let not_found = AppError::from(StoreError::NotFound {
            entity: "User",
            id: RecordId(4),
        });
        assert_eq!(StatusCode::NOT_FOUND, not_found.status());
        assert_eq!("User not found", not_found.to_string());

        let invalid = AppError::Validation("cursor must be a non-negative integer".into());
        assert_eq!(StatusCode::BAD_REQUEST, invalid.status());

        let db = AppError::from(StoreError::Db(anyhow::anyhow!("disk gone")));
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, db.status());
        // Internal details stay out of the body.
        assert_eq!("Internal server error", db.to_string());
    }
}
