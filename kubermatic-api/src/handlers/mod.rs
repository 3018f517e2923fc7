//! HTTP handlers, one module per resource

pub mod nodes;
pub mod projects;
pub mod users;

use axum::Json;
use serde_json::{json, Value};

/// Body returned by successful deletes
pub(crate) fn empty_object() -> Json<Value> {
    Json(json!({}))
}
