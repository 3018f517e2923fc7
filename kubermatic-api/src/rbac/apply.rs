//! Writing desired RBAC objects

use super::{DesiredRbac, RbacError, RbacResult, FIELD_MANAGER};
use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait RbacApplier: Send + Sync {
    /// Create or update every object in `desired`
    async fn apply(&self, desired: &DesiredRbac) -> RbacResult<()>;
}

/// Server-side apply against the Kubernetes API
#[derive(Clone)]
pub struct KubeApplier {
    client: Client,
}

impl KubeApplier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply_one<K>(&self, api: Api<K>, kind: &'static str, obj: &K) -> RbacResult<()>
    where
        K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
    {
        let name = obj.name_any();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(obj))
            .await
            .map_err(|source| RbacError::Apply {
                kind,
                name: name.clone(),
                source,
            })?;
        debug!(kind, name = %name, "applied");
        Ok(())
    }
}

#[async_trait]
impl RbacApplier for KubeApplier {
    async fn apply(&self, desired: &DesiredRbac) -> RbacResult<()> {
        for role in &desired.cluster_roles {
            self.apply_one(Api::<ClusterRole>::all(self.client.clone()), "ClusterRole", role)
                .await?;
        }
        for binding in &desired.cluster_role_bindings {
            self.apply_one(
                Api::<ClusterRoleBinding>::all(self.client.clone()),
                "ClusterRoleBinding",
                binding,
            )
            .await?;
        }
        for role in &desired.roles {
            let ns = role.namespace().unwrap_or_default();
            self.apply_one(Api::<Role>::namespaced(self.client.clone(), &ns), "Role", role)
                .await?;
        }
        for binding in &desired.role_bindings {
            let ns = binding.namespace().unwrap_or_default();
            self.apply_one(
                Api::<RoleBinding>::namespaced(self.client.clone(), &ns),
                "RoleBinding",
                binding,
            )
            .await?;
        }
        Ok(())
    }
}

/// Keyed by `namespace/name`, or `name` for cluster-scoped objects
fn key<K: kube::Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}/{}", ns, obj.name_any()),
        None => obj.name_any(),
    }
}

#[derive(Default)]
struct Applied {
    cluster_roles: BTreeMap<String, ClusterRole>,
    cluster_role_bindings: BTreeMap<String, ClusterRoleBinding>,
    roles: BTreeMap<String, Role>,
    role_bindings: BTreeMap<String, RoleBinding>,
}

/// Keeps applied objects in memory
#[derive(Default)]
pub struct MemoryApplier {
    applied: RwLock<Applied>,
}

impl MemoryApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cluster_role(&self, name: &str) -> Option<ClusterRole> {
        self.applied.read().await.cluster_roles.get(name).cloned()
    }

    pub async fn cluster_role_binding(&self, name: &str) -> Option<ClusterRoleBinding> {
        self.applied.read().await.cluster_role_bindings.get(name).cloned()
    }

    pub async fn role(&self, namespace: &str, name: &str) -> Option<Role> {
        let key = format!("{}/{}", namespace, name);
        self.applied.read().await.roles.get(&key).cloned()
    }

    pub async fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        let key = format!("{}/{}", namespace, name);
        self.applied.read().await.role_bindings.get(&key).cloned()
    }

    pub async fn cluster_role_names(&self) -> Vec<String> {
        self.applied.read().await.cluster_roles.keys().cloned().collect()
    }

    /// Total number of stored objects
    pub async fn len(&self) -> usize {
        let applied = self.applied.read().await;
        applied.cluster_roles.len()
            + applied.cluster_role_bindings.len()
            + applied.roles.len()
            + applied.role_bindings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RbacApplier for MemoryApplier {
    async fn apply(&self, desired: &DesiredRbac) -> RbacResult<()> {
        let mut applied = self.applied.write().await;
        for role in &desired.cluster_roles {
            applied.cluster_roles.insert(key(role), role.clone());
        }
        for binding in &desired.cluster_role_bindings {
            applied.cluster_role_bindings.insert(key(binding), binding.clone());
        }
        for role in &desired.roles {
            applied.roles.insert(key(role), role.clone());
        }
        for binding in &desired.role_bindings {
            applied.role_bindings.insert(key(binding), binding.clone());
        }
        Ok(())
    }
}
