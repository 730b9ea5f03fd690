//! Query parameters, path ids and the listing response shape.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::AppError;
use crate::pagination::{Direction, Page};
use crate::RecordId;

/// Raw query of `GET /api/users`. Values are parsed by hand so malformed ones become 400s.
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub cursor: Option<String>,
    pub direction: Option<String>,
}

/// Raw query of `GET /api/orders`.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub cursor: Option<String>,
}

/// Body of a listing response. Only the cursor key of the request direction is present, and it
/// is `null` when there is no adjacent page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Option<RecordId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<Option<RecordId>>,
}

impl<T> ListResponse<T> {
    /// A response without cursors, for unpaginated listings.
    pub fn all(data: Vec<T>) -> Self {
        Self {
            data,
            next_cursor: None,
            prev_cursor: None,
        }
    }
}

impl<T> From<Page<T>> for ListResponse<T> {
    fn from(page: Page<T>) -> Self {
        let (next_cursor, prev_cursor) = match page.direction {
            Direction::Next => (Some(page.next_cursor), None),
            Direction::Prev => (None, Some(page.prev_cursor)),
        };
        Self {
            data: page.items,
            next_cursor,
            prev_cursor,
        }
    }
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

/// Parses an optional id-valued query parameter. Empty values count as absent.
pub fn parse_optional_id(name: &str, raw: Option<&str>) -> Result<Option<RecordId>, AppError> {
    present(raw)
        .map(|value| {
            value.parse::<u64>().map(RecordId).map_err(|_| {
                AppError::Validation(format!(
                    "{name} must be a non-negative integer, got `{value}`"
                ))
            })
        })
        .transpose()
}

/// Parses the `direction` query parameter, defaulting to [`Direction::Next`].
pub fn parse_direction(raw: Option<&str>) -> Result<Direction, AppError> {
    present(raw)
        .map(|value| {
            value
                .parse::<Direction>()
                .map_err(|e| AppError::Validation(e.to_string()))
        })
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Parses an `{id}` path segment.
pub fn parse_path_id(raw: &str) -> Result<RecordId, AppError> {
    raw.parse::<u64>()
        .map(RecordId)
        .map_err(|_| AppError::Validation(format!("id must be a non-negative integer, got `{raw}`")))
}

/// Unwraps a JSON body, turning axum's rejection into a 400 with the usual error body.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}
