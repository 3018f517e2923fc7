//! UserProjectBinding management
//!
//! A binding puts one email into one group of one project. Its name is
//! derived from `(project, email, group)` so concurrent invitations of the
//! same user collide on create instead of producing duplicates.

use crate::crd::{self, Project, UserProjectBinding, UserProjectBindingSpec};
use crate::retry::{retry_on_conflict, RetryPolicy};
use crate::store::Store;
use kube::ResourceExt;
use kubermatic_common::{binding_name, emails_match, Error, Group, Result};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct BindingStore {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl BindingStore {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Bindings of `email` across all projects, oldest first
    pub async fn list_for_user(&self, email: &str) -> Result<Vec<UserProjectBinding>> {
        let bindings = self.store.list_bindings().await?;
        Ok(bindings
            .into_iter()
            .filter(|b| emails_match(&b.spec.user_email, email))
            .collect())
    }

    /// Bindings of a project, oldest first
    pub async fn list_for_project(&self, project_id: &str) -> Result<Vec<UserProjectBinding>> {
        let bindings = self.store.list_bindings().await?;
        Ok(bindings
            .into_iter()
            .filter(|b| b.spec.project_id == project_id)
            .collect())
    }

    /// The binding of `email` in `project_id`, if any
    pub async fn find(&self, project_id: &str, email: &str) -> Result<Option<UserProjectBinding>> {
        for group in Group::ALL {
            let name = binding_name(project_id, email, group);
            if let Some(binding) = self.store.get_binding(&name).await? {
                if binding.spec.project_id == project_id {
                    return Ok(Some(binding));
                }
            }
        }

        // bindings created outside this service may carry arbitrary names
        Ok(self
            .list_for_project(project_id)
            .await?
            .into_iter()
            .find(|b| emails_match(&b.spec.user_email, email)))
    }

    /// Add `email` to `project` in `group`.
    ///
    /// Fails with `Conflict` when the user already has any binding in the
    /// project, including when a concurrent create won the race.
    pub async fn create(
        &self,
        project: &Project,
        email: &str,
        group: Group,
    ) -> Result<UserProjectBinding> {
        let project_id = project.name_any();
        let already_member = || {
            Error::Conflict(format!(
                "cannot add the user = {} to the project {} because user is already in the project",
                email, project_id
            ))
        };

        if self.find(&project_id, email).await?.is_some() {
            return Err(already_member());
        }

        let mut binding = UserProjectBinding::new(
            &binding_name(&project_id, email, group),
            UserProjectBindingSpec {
                user_email: email.to_lowercase(),
                project_id: project_id.clone(),
                group: group.group_name(&project_id),
            },
        );
        binding.metadata.owner_references = Some(vec![crd::owner_reference(project)]);

        match self.store.create_binding(binding).await {
            Ok(created) => {
                info!(
                    project_id = %project_id,
                    email = %email,
                    group = %group,
                    "created binding"
                );
                Ok(created)
            }
            Err(e) if e.is_already_exists() => Err(already_member()),
            Err(e) => Err(e),
        }
    }

    /// Move the binding to another group. The binding keeps its name, only
    /// `spec.group` is rewritten.
    pub async fn update_group(
        &self,
        binding: &UserProjectBinding,
        group: Group,
    ) -> Result<UserProjectBinding> {
        let name = binding.name_any();
        let group_name = group.group_name(&binding.spec.project_id);
        let (store, name_ref, group_ref) = (&self.store, &name, &group_name);

        retry_on_conflict(&self.retry, || async move {
            let mut current = store.get_binding(name_ref).await?.ok_or_else(|| {
                Error::not_found("userprojectbindings.kubermatic.k8c.io", name_ref)
            })?;
            current.spec.group = group_ref.clone();
            store.update_binding(current).await
        })
        .await
        .inspect(|updated| {
            debug!(binding = %name, group = %updated.spec.group, "updated binding group");
        })
    }

    /// Remove `email` from `project_id`
    pub async fn delete(&self, project_id: &str, email: &str) -> Result<()> {
        let binding = self.find(project_id, email).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "cannot delete the user = {} from the project {} because the user is not a member of the project",
                email, project_id
            ))
        })?;
        self.store.delete_binding(&binding.name_any()).await?;
        info!(project_id = %project_id, email = %email, "deleted binding");
        Ok(())
    }
}
