use super::empty_object;
use crate::error::ApiResult;
use crate::middleware::auth::CurrentUser;
use crate::nodes::ClusterRef;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use kubermatic_common::api::{Node, NodeDeployment};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ClusterPath {
    project_id: String,
    dc: String,
    cluster_id: String,
}

impl ClusterPath {
    fn target(&self) -> ClusterRef<'_> {
        ClusterRef {
            project_id: &self.project_id,
            datacenter: &self.dc,
            cluster_id: &self.cluster_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NodePath {
    project_id: String,
    dc: String,
    cluster_id: String,
    node_id: String,
}

impl NodePath {
    fn target(&self) -> ClusterRef<'_> {
        ClusterRef {
            project_id: &self.project_id,
            datacenter: &self.dc,
            cluster_id: &self.cluster_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NodeDeploymentPath {
    project_id: String,
    dc: String,
    cluster_id: String,
    nodedeployment_id: String,
}

impl NodeDeploymentPath {
    fn target(&self) -> ClusterRef<'_> {
        ClusterRef {
            project_id: &self.project_id,
            datacenter: &self.dc,
            cluster_id: &self.cluster_id,
        }
    }
}

pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<ClusterPath>,
) -> ApiResult<Json<Vec<Node>>> {
    Ok(Json(state.nodes.list_nodes(user.email(), path.target()).await?))
}

pub async fn get_node(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<NodePath>,
) -> ApiResult<Json<Node>> {
    let node = state
        .nodes
        .get_node(user.email(), path.target(), &path.node_id)
        .await?;
    Ok(Json(node))
}

pub async fn create_node(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<ClusterPath>,
    body: Result<Json<Node>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Node>)> {
    let Json(node) = body?;
    let created = state
        .nodes
        .create_node(user.email(), path.target(), node)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_node(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<NodePath>,
) -> ApiResult<Json<Value>> {
    state
        .nodes
        .delete_node(user.email(), path.target(), &path.node_id)
        .await?;
    Ok(empty_object())
}

pub async fn list_node_deployments(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<ClusterPath>,
) -> ApiResult<Json<Vec<NodeDeployment>>> {
    let deployments = state
        .nodes
        .list_node_deployments(user.email(), path.target())
        .await?;
    Ok(Json(deployments))
}

pub async fn get_node_deployment(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<NodeDeploymentPath>,
) -> ApiResult<Json<NodeDeployment>> {
    let deployment = state
        .nodes
        .get_node_deployment(user.email(), path.target(), &path.nodedeployment_id)
        .await?;
    Ok(Json(deployment))
}

pub async fn create_node_deployment(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<ClusterPath>,
    body: Result<Json<NodeDeployment>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<NodeDeployment>)> {
    let Json(deployment) = body?;
    let created = state
        .nodes
        .create_node_deployment(user.email(), path.target(), deployment)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Body is a JSON merge patch (RFC 7386)
pub async fn patch_node_deployment(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<NodeDeploymentPath>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<NodeDeployment>> {
    let Json(patch) = body?;
    let patched = state
        .nodes
        .patch_node_deployment(user.email(), path.target(), &path.nodedeployment_id, &patch)
        .await?;
    Ok(Json(patched))
}

pub async fn delete_node_deployment(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<NodeDeploymentPath>,
) -> ApiResult<Json<Value>> {
    state
        .nodes
        .delete_node_deployment(user.email(), path.target(), &path.nodedeployment_id)
        .await?;
    Ok(empty_object())
}
