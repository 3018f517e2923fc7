//! Router assembly

use crate::handlers::{nodes, projects, users};
use crate::health;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const CLUSTER_PATH: &str = "/projects/:project_id/dc/:dc/clusters/:cluster_id";

fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/me", get(users::me))
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/:project_id",
            get(projects::get_project).delete(projects::delete_project),
        )
        .route(
            "/projects/:project_id/users",
            get(users::list_users).post(users::add_user),
        )
        .route(
            "/projects/:project_id/users/:user_id",
            axum::routing::put(users::edit_user).delete(users::delete_user),
        )
        .route(
            &format!("{}/nodes", CLUSTER_PATH),
            get(nodes::list_nodes).post(nodes::create_node),
        )
        .route(
            &format!("{}/nodes/:node_id", CLUSTER_PATH),
            get(nodes::get_node).delete(nodes::delete_node),
        )
        .route(
            &format!("{}/nodedeployments", CLUSTER_PATH),
            get(nodes::list_node_deployments).post(nodes::create_node_deployment),
        )
        .route(
            &format!("{}/nodedeployments/:nodedeployment_id", CLUSTER_PATH),
            get(nodes::get_node_deployment)
                .patch(nodes::patch_node_deployment)
                .delete(nodes::delete_node_deployment),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

/// Full application router, `/api/v1` plus unauthenticated health endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .with_state(state.clone())
        .nest("/api/v1", api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
