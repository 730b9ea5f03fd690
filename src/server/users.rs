use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::error::AppError;
use super::params::{
    json_body, parse_direction, parse_optional_id, parse_path_id, ListResponse, UserListQuery,
};
use super::state::{blocking, AppState};
use crate::pagination::paginate;
use crate::records::{LatestOrderWithProduct, User};
use crate::store::{NewUser, UserChanges};

const RESOURCE: &str = "users";

/// `GET /api/users?cursor=&direction=`
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<ListResponse<User>>, AppError> {
    let cursor = parse_optional_id("cursor", query.cursor.as_deref())?;
    let direction = parse_direction(query.direction.as_deref())?;
    let page = blocking(|| {
        paginate(
            &state.store.users(),
            cursor,
            direction,
            state.config.users_page_size,
        )
    })?;
    Ok(Json(page.into()))
}

/// `GET /api/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let id = parse_path_id(&id)?;
    blocking(|| state.store.get_user(id))?
        .map(Json)
        .ok_or(AppError::NotFound { entity: "User", id })
}

/// `POST /api/users`
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let new = json_body(payload)?;
    let user = blocking(|| state.store.create_user(new))?;
    state.invalidate(RESOURCE, None);
    Ok((StatusCode::CREATED, Json(user)))
}

/// `PUT /api/users/{id}`
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserChanges>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let id = parse_path_id(&id)?;
    let changes = json_body(payload)?;
    let user = blocking(|| state.store.update_user(id, changes))?;
    state.invalidate(RESOURCE, Some(id));
    Ok(Json(user))
}

/// `DELETE /api/users/{id}`
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_path_id(&id)?;
    let deleted = blocking(|| state.store.delete_user(id))?;
    state.invalidate(RESOURCE, Some(id));
    state.invalidate_latest_order(id);
    Ok(Json(json!({
        "message": "User deleted successfully",
        "deletedUser": deleted,
    })))
}

/// `GET /api/users/{id}/orders/latest`
pub async fn latest_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LatestOrderWithProduct>, AppError> {
    let id = parse_path_id(&id)?;
    let latest = blocking(|| -> Result<_, AppError> {
        if state.store.get_user(id)?.is_none() {
            return Err(AppError::NotFound { entity: "User", id });
        }
        Ok(state.store.latest_order_for_user(id)?)
    })?;
    latest.map(Json).ok_or(AppError::NotFound {
        entity: "Latest order",
        id,
    })
}
