use super::empty_object;
use crate::authz::Operation;
use crate::error::ApiResult;
use crate::middleware::auth::CurrentUser;
use crate::projects::to_api_project;
use crate::state::AppState;
use crate::validation;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use kubermatic_common::api;
use serde_json::Value;
use std::sync::Arc;

/// Projects the caller is a member of
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<api::Project>>> {
    let projects = state.projects.list_for_user(user.email()).await?;
    Ok(Json(projects.iter().map(to_api_project).collect()))
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    body: Result<Json<api::CreateProjectRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<api::Project>)> {
    let Json(body) = body?;
    validation::validate_project_name(&body.name)?;
    let project = state.projects.create(&user.0, &body.name).await?;
    Ok((StatusCode::CREATED, Json(to_api_project(&project))))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<api::Project>> {
    state
        .gate
        .authorize(user.email(), &project_id, Operation::GetProject)
        .await?;
    let project = state.projects.get(&project_id).await?;
    Ok(Json(to_api_project(&project)))
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .gate
        .authorize(user.email(), &project_id, Operation::DeleteProject)
        .await?;
    state.projects.delete(&project_id).await?;
    Ok(empty_object())
}
