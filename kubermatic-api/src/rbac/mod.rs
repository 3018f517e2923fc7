//! RBAC synthesis
//!
//! Every project-owned resource gets one ClusterRole/ClusterRoleBinding pair
//! (or Role/RoleBinding pair for namespaced resources) per group, bound to
//! the group subject `<groupPrefix>-<projectID>`. Names and labels are
//! consumed by other cluster tooling and must stay stable.

pub mod apply;
pub mod controller;
pub mod plural;
pub mod resources;

pub use self::apply::{KubeApplier, MemoryApplier, RbacApplier};
pub use self::controller::{MemoryDriver, Reconciler};
pub use self::plural::{
    BuiltinResolver, ChainResolver, DiscoveryResolver, PluralResolver, StaticResolver,
};
pub use self::resources::{DesiredRbac, RbacTarget};

use kube::api::GroupVersionKind;
use kubermatic_common::Group;
use thiserror::Error;

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
/// Label carried by every generated role and binding
pub const ROLE_LABEL: &str = "authz.k8c.io/role";
pub const RBAC_NAME_PREFIX: &str = "kubermatic";
pub const FIELD_MANAGER: &str = "kubermatic-rbac-controller";

/// `kubermatic:<lower(kind)>-<resourceName>:<groupPrefix>-<projectID>`
pub fn generate_rbac_name(kind: &str, resource_name: &str, group: Group, project_id: &str) -> String {
    format!(
        "{}:{}-{}:{}",
        RBAC_NAME_PREFIX,
        kind.to_lowercase(),
        resource_name,
        group.group_name(project_id)
    )
}

/// Verbs granted to `group` on a single named resource of `kind`
pub fn verbs_for(kind: &str, group: Group) -> Vec<String> {
    let verbs: &[&str] = match (kind, group) {
        (_, Group::Owners) => &["get", "update", "patch", "delete"],
        ("Project", Group::Editors) => &["get"],
        (_, Group::Editors) => &["get", "update", "patch", "delete"],
        (_, Group::Viewers) => &["get"],
    };
    verbs.iter().map(|v| v.to_string()).collect()
}

/// `Kind.group`, or just `Kind` for the core group
pub fn group_kind(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.kind.clone()
    } else {
        format!("{}.{}", gvk.kind, gvk.group)
    }
}

#[derive(Debug, Error)]
pub enum RbacError {
    #[error("failed to get CRD for GroupVersionKind: {0}")]
    CrdLookup(String),

    #[error("failed to get REST Mapping for '{group_kind}': {source}")]
    RestMapping {
        group_kind: String,
        #[source]
        source: kube::Error,
    },

    #[error("no plural resource name known for '{0}'")]
    Unresolved(String),

    #[error("{kind} {name} has no project-id label")]
    MissingProject { kind: String, name: String },

    #[error("failed to apply {kind} {name}: {source}")]
    Apply {
        kind: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Store(#[from] kubermatic_common::Error),
}

impl From<RbacError> for kubermatic_common::Error {
    fn from(err: RbacError) -> Self {
        match err {
            RbacError::Store(e) => e,
            other => kubermatic_common::Error::Internal(other.to_string()),
        }
    }
}

pub type RbacResult<T> = std::result::Result<T, RbacError>;
