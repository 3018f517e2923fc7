//! Common test utilities and helpers

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kubermatic_api::bindings::BindingStore;
use kubermatic_api::crd::{
    Cluster, ClusterSpec, ClusterStatus, ExtendedClusterHealth, Project, ProjectSpec, ProjectStatus,
    User, UserSpec, PROJECT_ID_LABEL,
};
use kubermatic_api::middleware::auth::JwtAuth;
use kubermatic_api::nodes::MemoryNodeProvider;
use kubermatic_api::retry::RetryPolicy;
use kubermatic_api::routes::build_router;
use kubermatic_api::store::{MemoryStore, Store};
use kubermatic_api::AppState;
use kubermatic_common::{user_id_for_email, Group, ProjectPhase};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub const JOHN_ID: &str = "4b2d8785b49bad23638b17d8db76857a79bf79441241a78a97d88cc64bbf766e";
pub const BOB_ID: &str = "405ac8384fa984f787f9486daf34d84d98f20c4d6a12e2cc4ed89be3bcb06ad6";
pub const ALICE_ID: &str = "0a0a58273565a8f3dcf779375d9debd0f685d94dc56651a16bff3bf901c0b127";

/// Router over an in-memory store, plus direct handles for seeding
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MemoryNodeProvider>,
    pub state: Arc<AppState>,
    pub router: Router,
    auth: Arc<JwtAuth>,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(MemoryNodeProvider::new());
        let state = Arc::new(AppState::new(
            store.clone(),
            provider.clone(),
            RetryPolicy::default(),
            JwtAuth::new(JWT_SECRET, None),
        ));
        Self {
            router: build_router(state.clone()),
            auth: state.auth.clone(),
            store,
            provider,
            state,
        }
    }

    pub fn token(&self, email: &str, name: &str) -> String {
        self.auth
            .generate_token(email, name, chrono::Duration::hours(1))
            .unwrap()
    }

    pub async fn add_user(&self, name: &str, email: &str) -> User {
        let mut user = User::new(
            &user_id_for_email(email),
            UserSpec {
                name: name.to_string(),
                email: email.to_string(),
                is_admin: false,
            },
        );
        user.metadata.creation_timestamp = Some(Time(Utc.with_ymd_and_hms(2013, 2, 3, 19, 54, 0).unwrap()));
        self.store.create_user(user).await.unwrap()
    }

    /// Active project named `name` with id `<name>-ID`
    pub async fn add_project(&self, name: &str) -> Project {
        let mut project = Project::new(
            &format!("{}-ID", name),
            ProjectSpec {
                name: name.to_string(),
            },
        );
        project.status = Some(ProjectStatus {
            phase: ProjectPhase::Active,
        });
        self.store.create_project(project).await.unwrap()
    }

    pub async fn bind(&self, project_id: &str, email: &str, group: Group) {
        let project = match self.store.get_project(project_id).await.unwrap() {
            Some(project) => project,
            // bindings may point at projects that do not exist
            None => Project::new(
                project_id,
                ProjectSpec {
                    name: project_id.to_string(),
                },
            ),
        };
        BindingStore::new(self.store.clone(), RetryPolicy::default())
            .create(&project, email, group)
            .await
            .unwrap();
    }

    pub async fn add_cluster(&self, id: &str, project_id: &str, healthy: bool) -> Cluster {
        let mut cluster = Cluster::new(
            id,
            ClusterSpec {
                human_readable_name: id.to_string(),
                datacenter: "us-central1".to_string(),
            },
        );
        cluster
            .labels_mut()
            .insert(PROJECT_ID_LABEL.to_string(), project_id.to_string());
        cluster.status = Some(ClusterStatus {
            namespace_name: format!("cluster-{}", id),
            extended_health: if healthy {
                ExtendedClusterHealth::all_up()
            } else {
                ExtendedClusterHealth::default()
            },
        });
        self.store.create_cluster(cluster).await.unwrap()
    }

    /// Send a request as `(email, name)` and decode the JSON response
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        caller: Option<(&str, &str)>,
        body: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((email, name)) = caller {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.token(email, name)),
            );
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, caller: (&str, &str)) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(caller), None).await
    }

    pub async fn binding_names(&self) -> Vec<String> {
        self.store
            .list_bindings()
            .await
            .unwrap()
            .iter()
            .map(|b| b.name_any())
            .collect()
    }
}

pub const JOHN: (&str, &str) = ("john@acme.com", "john");
pub const BOB: (&str, &str) = ("bob@acme.com", "Bob");

/// `{"error":{"code":..,"message":..}}`
pub fn error_body(code: u16, message: &str) -> Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}
