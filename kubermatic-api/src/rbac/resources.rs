//! Desired RBAC objects for a project-owned resource

use super::{generate_rbac_name, verbs_for, RBAC_API_GROUP, ROLE_LABEL};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::GroupVersionKind;
use kube::{Resource, ResourceExt};
use kubermatic_common::Group;
use std::collections::BTreeMap;

/// A named resource that RBAC is generated for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacTarget {
    pub gvk: GroupVersionKind,
    pub plural: String,
    pub name: String,
    pub uid: String,
    /// Set for namespaced resources, which get Roles instead of ClusterRoles
    pub namespace: Option<String>,
    pub project_id: String,
}

impl RbacTarget {
    pub fn for_object<K>(obj: &K, plural: String, project_id: &str) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            gvk: gvk_of::<K>(),
            plural,
            name: obj.name_any(),
            uid: obj.meta().uid.clone().unwrap_or_default(),
            namespace: obj.namespace(),
            project_id: project_id.to_string(),
        }
    }

    fn api_version(&self) -> String {
        if self.gvk.group.is_empty() {
            self.gvk.version.clone()
        } else {
            format!("{}/{}", self.gvk.group, self.gvk.version)
        }
    }

    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version(),
            kind: self.gvk.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            ..Default::default()
        }
    }

    pub fn rbac_name(&self, group: Group) -> String {
        generate_rbac_name(&self.gvk.kind, &self.name, group, &self.project_id)
    }

    fn metadata(&self, group: Group) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.rbac_name(group)),
            namespace: self.namespace.clone(),
            labels: Some(BTreeMap::from([(
                ROLE_LABEL.to_string(),
                group.group_name(&self.project_id),
            )])),
            owner_references: Some(vec![self.owner_reference()]),
            ..Default::default()
        }
    }

    fn rules(&self, group: Group) -> Vec<PolicyRule> {
        vec![PolicyRule {
            api_groups: Some(vec![self.gvk.group.clone()]),
            resources: Some(vec![self.plural.clone()]),
            resource_names: Some(vec![self.name.clone()]),
            verbs: verbs_for(&self.gvk.kind, group),
            ..Default::default()
        }]
    }

    fn subjects(&self, group: Group) -> Vec<Subject> {
        vec![Subject {
            kind: "Group".to_string(),
            api_group: Some(RBAC_API_GROUP.to_string()),
            name: group.group_name(&self.project_id),
            namespace: None,
        }]
    }

    fn role_ref(&self, kind: &str, group: Group) -> RoleRef {
        RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: kind.to_string(),
            name: self.rbac_name(group),
        }
    }

    pub fn cluster_role(&self, group: Group) -> ClusterRole {
        ClusterRole {
            metadata: self.metadata(group),
            rules: Some(self.rules(group)),
            ..Default::default()
        }
    }

    pub fn cluster_role_binding(&self, group: Group) -> ClusterRoleBinding {
        ClusterRoleBinding {
            metadata: self.metadata(group),
            role_ref: self.role_ref("ClusterRole", group),
            subjects: Some(self.subjects(group)),
        }
    }

    pub fn role(&self, group: Group) -> Role {
        Role {
            metadata: self.metadata(group),
            rules: Some(self.rules(group)),
        }
    }

    pub fn role_binding(&self, group: Group) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata(group),
            role_ref: self.role_ref("Role", group),
            subjects: Some(self.subjects(group)),
        }
    }

    /// Roles and bindings for every group
    pub fn desired(&self) -> DesiredRbac {
        let mut desired = DesiredRbac::default();
        for group in Group::ALL {
            if self.namespace.is_some() {
                desired.roles.push(self.role(group));
                desired.role_bindings.push(self.role_binding(group));
            } else {
                desired.cluster_roles.push(self.cluster_role(group));
                desired.cluster_role_bindings.push(self.cluster_role_binding(group));
            }
        }
        desired
    }
}

/// Group/version/kind of a statically typed resource
pub fn gvk_of<K: Resource<DynamicType = ()>>() -> GroupVersionKind {
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

#[derive(Debug, Clone, Default)]
pub struct DesiredRbac {
    pub cluster_roles: Vec<ClusterRole>,
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
    pub roles: Vec<Role>,
    pub role_bindings: Vec<RoleBinding>,
}
