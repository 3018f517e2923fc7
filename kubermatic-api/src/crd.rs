//! Custom Resource Definitions for the kubermatic.k8c.io API group.
//!
//! The CRDs installed into master and seed clusters are derived from these
//! types, and the RBAC controller reads plural names from them so that RBAC
//! can be generated for kinds whose CRDs are not installed locally.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::GroupVersionKind;
use kube::{CustomResource, CustomResourceExt, Resource, ResourceExt};
use kubermatic_common::{Error, ProjectPhase, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "kubermatic.k8c.io";
pub const VERSION: &str = "v1";
pub const API_VERSION: &str = "kubermatic.k8c.io/v1";

/// Label carried by project-scoped resources such as clusters
pub const PROJECT_ID_LABEL: &str = "project-id";

/// User is the cluster-scoped record of a person who logged in at least once.
/// Its name is `hex(sha256(lowercase(email)))`.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubermatic.k8c.io",
    version = "v1",
    kind = "User",
    plural = "users",
    printcolumn = r#"{"name":"Email","type":"string","jsonPath":".spec.email"}"#,
    printcolumn = r#"{"name":"Name","type":"string","jsonPath":".spec.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Project groups clusters and memberships of a tenant.
///
/// Example:
/// ```yaml
/// apiVersion: kubermatic.k8c.io/v1
/// kind: Project
/// metadata:
///   name: plan9-ID
/// spec:
///   name: plan9
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubermatic.k8c.io",
    version = "v1",
    kind = "Project",
    plural = "projects",
    status = "ProjectStatus",
    printcolumn = r#"{"name":"HumanReadableName","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    /// Human readable name
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub phase: ProjectPhase,
}

/// UserProjectBinding places one user (by email) into one group of one project.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubermatic.k8c.io",
    version = "v1",
    kind = "UserProjectBinding",
    plural = "userprojectbindings",
    printcolumn = r#"{"name":"ProjectID","type":"string","jsonPath":".spec.projectID"}"#,
    printcolumn = r#"{"name":"Group","type":"string","jsonPath":".spec.group"}"#
)]
pub struct UserProjectBindingSpec {
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "projectID")]
    pub project_id: String,
    /// `<groupPrefix>-<projectID>`
    pub group: String,
}

/// Cluster is a user cluster hosted on a seed. Only the fields the
/// authorization core consumes are modelled.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubermatic.k8c.io",
    version = "v1",
    kind = "Cluster",
    plural = "clusters",
    status = "ClusterStatus",
    printcolumn = r#"{"name":"HumanReadableName","type":"string","jsonPath":".spec.humanReadableName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub human_readable_name: String,
    #[serde(default)]
    pub datacenter: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub namespace_name: String,
    #[serde(default)]
    pub extended_health: ExtendedClusterHealth,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum HealthStatus {
    #[default]
    HealthStatusDown,
    HealthStatusUp,
    HealthStatusProvisioning,
}

/// Health of the control plane components of a user cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedClusterHealth {
    #[serde(default)]
    pub apiserver: HealthStatus,
    #[serde(default)]
    pub scheduler: HealthStatus,
    #[serde(default)]
    pub controller: HealthStatus,
    #[serde(default)]
    pub machine_controller: HealthStatus,
    #[serde(default)]
    pub etcd: HealthStatus,
}

impl ExtendedClusterHealth {
    pub fn all_up() -> Self {
        Self {
            apiserver: HealthStatus::HealthStatusUp,
            scheduler: HealthStatus::HealthStatusUp,
            controller: HealthStatus::HealthStatusUp,
            machine_controller: HealthStatus::HealthStatusUp,
            etcd: HealthStatus::HealthStatusUp,
        }
    }

    /// All components required for node management are up
    pub fn all_healthy(&self) -> bool {
        [
            self.apiserver,
            self.scheduler,
            self.controller,
            self.machine_controller,
            self.etcd,
        ]
        .iter()
        .all(|s| *s == HealthStatus::HealthStatusUp)
    }
}

impl Cluster {
    pub fn project_id(&self) -> Option<&str> {
        self.labels().get(PROJECT_ID_LABEL).map(String::as_str)
    }

    pub fn is_healthy(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.extended_health.all_healthy())
            .unwrap_or(false)
    }
}

impl Project {
    pub fn phase(&self) -> ProjectPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}

/// Owner reference pointing at `obj`, used to tie bindings to projects
/// and projects to their creator.
pub fn owner_reference<K>(obj: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: obj.name_any(),
        uid: obj.meta().uid.clone().unwrap_or_default(),
        ..Default::default()
    }
}

/// Every CRD compiled into this binary
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![User::crd(), Project::crd(), UserProjectBinding::crd(), Cluster::crd()]
}

/// API groups covered by the compiled-in CRDs
pub fn groups() -> Vec<String> {
    let mut groups: Vec<String> = all_crds().into_iter().map(|c| c.spec.group).collect();
    groups.sort();
    groups.dedup();
    groups
}

/// Find the compiled-in CRD serving `gvk`
pub fn crd_for_gvk(gvk: &GroupVersionKind) -> Result<CustomResourceDefinition> {
    all_crds()
        .into_iter()
        .find(|crd| {
            crd.spec.group == gvk.group
                && crd.spec.names.kind == gvk.kind
                && crd.spec.versions.iter().any(|v| v.name == gvk.version)
        })
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no CRD found for {}/{}, Kind={}",
                gvk.group, gvk.version, gvk.kind
            ))
        })
}
