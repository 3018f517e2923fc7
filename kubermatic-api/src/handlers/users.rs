use super::empty_object;
use crate::error::ApiResult;
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use kubermatic_common::api;
use serde_json::Value;
use std::sync::Arc;

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<api::User>> {
    Ok(Json(state.memberships.me(&user.0).await?))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<api::User>>> {
    let users = state.memberships.list(user.email(), &project_id).await?;
    Ok(Json(users))
}

pub async fn add_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(project_id): Path<String>,
    body: Result<Json<api::User>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<api::User>)> {
    let Json(body) = body?;
    let added = state
        .memberships
        .add(user.email(), &project_id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn edit_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((project_id, user_id)): Path<(String, String)>,
    body: Result<Json<api::User>, JsonRejection>,
) -> ApiResult<Json<api::User>> {
    let Json(body) = body?;
    let edited = state
        .memberships
        .edit(user.email(), &project_id, &user_id, &body)
        .await?;
    Ok(Json(edited))
}

/// The member is addressed by the path, any request body is ignored
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((project_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    state
        .memberships
        .delete(user.email(), &project_id, &user_id)
        .await?;
    Ok(empty_object())
}
