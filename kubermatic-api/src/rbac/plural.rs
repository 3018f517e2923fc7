//! Plural resource name resolution
//!
//! RBAC rules address resources by plural name. Kinds from our own API
//! groups are resolved from the CRDs compiled into the binary, so RBAC can
//! be generated for kinds whose CRDs are not installed on this cluster.
//! Everything else goes through API discovery.

use super::{group_kind, RbacError, RbacResult};
use crate::crd;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::GroupVersionKind;
use kube::Client;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait PluralResolver: Send + Sync {
    /// Plural name of `gvk`, or `None` when this resolver does not handle it
    async fn resolve(&self, gvk: &GroupVersionKind) -> RbacResult<Option<String>>;
}

/// Compiled-in CRDs. Unknown kinds of our groups are errors.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    groups: Vec<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self {
            groups: crd::groups(),
        }
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluralResolver for StaticResolver {
    async fn resolve(&self, gvk: &GroupVersionKind) -> RbacResult<Option<String>> {
        if !self.groups.iter().any(|g| *g == gvk.group) {
            return Ok(None);
        }
        let crd = crd::crd_for_gvk(gvk).map_err(|e| RbacError::CrdLookup(e.to_string()))?;
        Ok(Some(crd.spec.names.plural))
    }
}

fn builtin<K: k8s_openapi::Resource>() -> (&'static str, &'static str, &'static str) {
    (K::GROUP, K::KIND, K::URL_PATH_SEGMENT)
}

/// Well-known built-in kinds, for running without an API server
#[derive(Debug, Clone)]
pub struct BuiltinResolver {
    kinds: Vec<(&'static str, &'static str, &'static str)>,
}

impl BuiltinResolver {
    pub fn new() -> Self {
        Self {
            kinds: vec![
                builtin::<Secret>(),
                builtin::<ConfigMap>(),
                builtin::<Namespace>(),
                builtin::<ServiceAccount>(),
                builtin::<Role>(),
                builtin::<RoleBinding>(),
                builtin::<ClusterRole>(),
                builtin::<ClusterRoleBinding>(),
            ],
        }
    }
}

impl Default for BuiltinResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluralResolver for BuiltinResolver {
    async fn resolve(&self, gvk: &GroupVersionKind) -> RbacResult<Option<String>> {
        Ok(self
            .kinds
            .iter()
            .find(|(group, kind, _)| *group == gvk.group && *kind == gvk.kind)
            .map(|(_, _, plural)| plural.to_string()))
    }
}

/// Live API discovery
#[derive(Clone)]
pub struct DiscoveryResolver {
    client: Client,
}

impl DiscoveryResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluralResolver for DiscoveryResolver {
    async fn resolve(&self, gvk: &GroupVersionKind) -> RbacResult<Option<String>> {
        let (resource, _) = kube::discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|source| RbacError::RestMapping {
                group_kind: group_kind(gvk),
                source,
            })?;
        Ok(Some(resource.plural))
    }
}

/// Tries each resolver in order; the first answer wins
#[derive(Clone, Default)]
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn PluralResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl PluralResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Compiled-in CRDs, then discovery through `client`
    pub fn for_cluster(client: Client) -> Self {
        Self::new()
            .with(StaticResolver::new())
            .with(DiscoveryResolver::new(client))
    }

    /// Compiled-in CRDs, then well-known built-in kinds
    pub fn offline() -> Self {
        Self::new()
            .with(StaticResolver::new())
            .with(BuiltinResolver::new())
    }

    /// Resolve or fail with the error of the stage that rejected `gvk`
    pub async fn plural_for(&self, gvk: &GroupVersionKind) -> RbacResult<String> {
        self.resolve(gvk)
            .await?
            .ok_or_else(|| RbacError::Unresolved(group_kind(gvk)))
    }
}

#[async_trait]
impl PluralResolver for ChainResolver {
    async fn resolve(&self, gvk: &GroupVersionKind) -> RbacResult<Option<String>> {
        for resolver in &self.resolvers {
            if let Some(plural) = resolver.resolve(gvk).await? {
                debug!(kind = %gvk.kind, group = %gvk.group, plural = %plural, "resolved plural name");
                return Ok(Some(plural));
            }
        }
        Ok(None)
    }
}
