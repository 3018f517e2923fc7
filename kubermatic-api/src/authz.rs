//! Project-scoped authorization gate

use crate::bindings::BindingStore;
use crate::crd::UserProjectBinding;
use kubermatic_common::{Error, Group, Result};
use std::fmt;
use tracing::debug;

/// Project-scoped operations subject to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListUsers,
    AddUser,
    EditUser,
    DeleteUser,
    GetProject,
    DeleteProject,
    ListNodes,
    GetNode,
    CreateNode,
    DeleteNode,
    ListNodeDeployments,
    GetNodeDeployment,
    CreateNodeDeployment,
    PatchNodeDeployment,
    DeleteNodeDeployment,
}

impl Operation {
    /// Lowest group allowed to perform the operation
    pub fn minimum_group(&self) -> Group {
        use Operation::*;
        match self {
            ListUsers | GetProject | ListNodes | GetNode | ListNodeDeployments
            | GetNodeDeployment => Group::Viewers,
            CreateNode | DeleteNode | CreateNodeDeployment | PatchNodeDeployment
            | DeleteNodeDeployment => Group::Editors,
            AddUser | EditUser | DeleteUser | DeleteProject => Group::Owners,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use Operation::*;
        match self {
            ListUsers => "list users",
            AddUser => "add users",
            EditUser => "edit users",
            DeleteUser => "delete users",
            GetProject => "get the project",
            DeleteProject => "delete the project",
            ListNodes => "list nodes",
            GetNode => "get nodes",
            CreateNode => "create nodes",
            DeleteNode => "delete nodes",
            ListNodeDeployments => "list node deployments",
            GetNodeDeployment => "get node deployments",
            CreateNodeDeployment => "create node deployments",
            PatchNodeDeployment => "patch node deployments",
            DeleteNodeDeployment => "delete node deployments",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a caller may act on a project
#[derive(Clone)]
pub struct AuthorizationGate {
    bindings: BindingStore,
}

impl AuthorizationGate {
    pub fn new(bindings: BindingStore) -> Self {
        Self { bindings }
    }

    /// Returns the caller's binding when they may perform `operation`
    pub async fn authorize(
        &self,
        caller_email: &str,
        project_id: &str,
        operation: Operation,
    ) -> Result<UserProjectBinding> {
        let binding = self
            .bindings
            .find(project_id, caller_email)
            .await?
            .ok_or_else(|| {
                Error::Forbidden(format!(
                    "forbidden: The user \"{}\" doesn't belong to the given project = {}",
                    caller_email, project_id
                ))
            })?;

        let required = operation.minimum_group();
        let group = Group::from_group_name(&binding.spec.group, project_id);
        match group {
            Some(group) if group.covers(required) => {
                debug!(
                    email = %caller_email,
                    project_id = %project_id,
                    operation = %operation,
                    group = %group,
                    "authorized"
                );
                Ok(binding)
            }
            _ => Err(Error::Forbidden(format!(
                "forbidden: The user \"{}\" is not allowed to {} in the project = {}, {} group is required",
                caller_email, operation, project_id, required
            ))),
        }
    }
}
