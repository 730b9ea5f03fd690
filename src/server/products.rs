use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::error::AppError;
use super::params::{json_body, parse_path_id, ListResponse};
use super::state::{blocking, AppState};
use crate::records::Product;
use crate::store::{NewProduct, ProductChanges};

const RESOURCE: &str = "products";

/// `GET /api/products`, every product in id order.
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Product>>, AppError> {
    let products = blocking(|| state.store.list_products())?;
    Ok(Json(ListResponse::all(products)))
}

/// `GET /api/products/{id}`
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    let id = parse_path_id(&id)?;
    blocking(|| state.store.get_product(id))?
        .map(Json)
        .ok_or(AppError::NotFound {
            entity: "Product",
            id,
        })
}

/// `POST /api/products`
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let new = json_body(payload)?;
    if !new.price.is_finite() || new.price < 0.0 {
        return Err(AppError::Validation(
            "price must be a non-negative number".to_string(),
        ));
    }
    let product = blocking(|| state.store.create_product(new))?;
    state.invalidate(RESOURCE, None);
    Ok((StatusCode::CREATED, Json(product)))
}

/// `PUT /api/products/{id}`
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProductChanges>, JsonRejection>,
) -> Result<Json<Product>, AppError> {
    let id = parse_path_id(&id)?;
    let changes = json_body(payload)?;
    if changes.price.is_some_and(|price| !price.is_finite() || price < 0.0) {
        return Err(AppError::Validation(
            "price must be a non-negative number".to_string(),
        ));
    }
    let product = blocking(|| state.store.update_product(id, changes))?;
    state.invalidate(RESOURCE, Some(id));
    Ok(Json(product))
}

/// `DELETE /api/products/{id}`
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_path_id(&id)?;
    let deleted = blocking(|| state.store.delete_product(id))?;
    state.invalidate(RESOURCE, Some(id));
    Ok(Json(json!({
        "message": "Product deleted successfully",
        "deletedProduct": deleted,
    })))
}
