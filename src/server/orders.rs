use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::error::AppError;
use super::params::{json_body, parse_optional_id, parse_path_id, ListResponse, OrderListQuery};
use super::state::{blocking, AppState};
use crate::pagination::{paginate, Direction};
use crate::records::Order;
use crate::store::{NewOrder, OrderChanges};

/// `GET /api/orders?userId=&cursor=`, always paging forward.
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ListResponse<Order>>, AppError> {
    let user_id = parse_optional_id("userId", query.user_id.as_deref())?;
    let cursor = parse_optional_id("cursor", query.cursor.as_deref())?;
    let page_size = state.config.orders_page_size;
    let store = &state.store;

    let page = blocking(|| {
        let page = match user_id {
            Some(user_id) => paginate(
                &store.orders_of_user(user_id),
                cursor,
                Direction::Next,
                page_size,
            )?,
            None => paginate(&store.orders(), cursor, Direction::Next, page_size)?,
        };
        page.try_map(|record| store.hydrate_order(record))
    })?;
    Ok(Json(page.into()))
}

/// `GET /api/orders/{id}`
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let id = parse_path_id(&id)?;
    blocking(|| state.store.get_order(id))?
        .map(Json)
        .ok_or(AppError::NotFound {
            entity: "Order",
            id,
        })
}

/// `POST /api/orders`
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let new = json_body(payload)?;
    if new.order_products.iter().any(|line| line.quantity == Some(0)) {
        return Err(AppError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }
    let order = blocking(|| state.store.create_order(new))?;
    state.invalidate_latest_order(order.user_id);
    Ok((StatusCode::CREATED, Json(order)))
}

/// `PUT /api/orders/{id}`
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<OrderChanges>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let id = parse_path_id(&id)?;
    let changes = json_body(payload)?;
    let order = blocking(|| state.store.update_order(id, changes))?;
    state.invalidate_latest_order(order.user_id);
    Ok(Json(order))
}

/// `DELETE /api/orders/{id}`
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_path_id(&id)?;
    let deleted = blocking(|| state.store.delete_order(id))?;
    state.invalidate_latest_order(deleted.user_id);
    Ok(Json(json!({ "message": "Order deleted successfully" })))
}
