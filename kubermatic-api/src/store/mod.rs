//! Backing store for users, projects, bindings and clusters.
//!
//! Two implementations share the [`Store`] trait: [`MemoryStore`] for local
//! development and tests, and [`KubeStore`] which persists the CRDs through
//! the Kubernetes API.

pub mod kubernetes;
pub mod memory;

pub use self::kubernetes::KubeStore;
pub use self::memory::MemoryStore;

use crate::crd::{Cluster, Project, User, UserProjectBinding};
use async_trait::async_trait;
use kubermatic_common::Result;

/// Resource kinds held by a [`Store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    User,
    Project,
    UserProjectBinding,
    Cluster,
}

impl ResourceKind {
    /// Plural resource name, as used in Kubernetes API paths and errors
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::User => "users",
            ResourceKind::Project => "projects",
            ResourceKind::UserProjectBinding => "userprojectbindings",
            ResourceKind::Cluster => "clusters",
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.plural(), crate::crd::GROUP)
    }
}

/// Change notification published by stores that support watching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: ResourceKind,
    pub name: String,
    /// Project the object belongs to, when it has one
    pub project_id: Option<String>,
    pub deleted: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Reachability check that reads at most one object
    async fn ping(&self) -> Result<()>;

    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    /// Fails with `AlreadyExists` when a user with the same name exists
    async fn create_user(&self, user: User) -> Result<User>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn create_project(&self, project: Project) -> Result<Project>;
    /// Writes `status` only. Fails with `ResourceConflict` when the
    /// resource version is stale.
    async fn update_project_status(&self, project: Project) -> Result<Project>;
    async fn delete_project(&self, id: &str) -> Result<()>;

    async fn get_binding(&self, name: &str) -> Result<Option<UserProjectBinding>>;
    /// All bindings, oldest first
    async fn list_bindings(&self) -> Result<Vec<UserProjectBinding>>;
    async fn create_binding(&self, binding: UserProjectBinding) -> Result<UserProjectBinding>;
    /// Fails with `ResourceConflict` when the resource version is stale
    async fn update_binding(&self, binding: UserProjectBinding) -> Result<UserProjectBinding>;
    async fn delete_binding(&self, name: &str) -> Result<()>;

    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>>;
    async fn list_clusters(&self) -> Result<Vec<Cluster>>;
    async fn create_cluster(&self, cluster: Cluster) -> Result<Cluster>;
}
