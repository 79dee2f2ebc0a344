use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::pagination::Pagination;

/// Success envelope: `{ "success": true, "data": ... }`.
pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, ok(data))
}

pub fn list<T: Serialize>(data: T, pagination: Pagination) -> Json<Value> {
    Json(json!({ "success": true, "data": data, "pagination": pagination }))
}
