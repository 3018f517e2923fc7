//! Project lifecycle

use crate::bindings::BindingStore;
use crate::crd::{self, Project, ProjectSpec, ProjectStatus, User};
use crate::retry::{retry_on_conflict, RetryPolicy};
use crate::store::{ResourceKind, Store};
use kube::ResourceExt;
use kubermatic_common::{api, Error, Group, ProjectPhase, Result};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

const PROJECT_ID_LENGTH: usize = 10;
const PROJECT_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random project identifier of lowercase alphanumerics
pub fn generate_project_id() -> String {
    let mut rng = rand::thread_rng();
    (0..PROJECT_ID_LENGTH)
        .map(|_| PROJECT_ID_CHARSET[rng.gen_range(0..PROJECT_ID_CHARSET.len())] as char)
        .collect()
}

/// Wire representation of a project
pub fn to_api_project(project: &Project) -> api::Project {
    api::Project {
        id: project.name_any(),
        name: project.spec.name.clone(),
        creation_timestamp: project
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or_default(),
        status: project.phase().to_string(),
    }
}

#[derive(Clone)]
pub struct ProjectManager {
    store: Arc<dyn Store>,
    bindings: BindingStore,
    retry: RetryPolicy,
}

impl ProjectManager {
    pub fn new(store: Arc<dyn Store>, bindings: BindingStore, retry: RetryPolicy) -> Self {
        Self {
            store,
            bindings,
            retry,
        }
    }

    /// Create a project owned by `owner`, who becomes its only owner.
    ///
    /// The project starts `Inactive` until RBAC has been generated for it.
    pub async fn create(&self, owner: &User, name: &str) -> Result<Project> {
        let mut project = Project::new(
            &generate_project_id(),
            ProjectSpec {
                name: name.to_string(),
            },
        );
        project.metadata.owner_references = Some(vec![crd::owner_reference(owner)]);
        project.status = Some(ProjectStatus {
            phase: ProjectPhase::Inactive,
        });

        let project = self.store.create_project(project).await?;
        let project_id = project.name_any();

        if let Err(e) = self
            .bindings
            .create(&project, &owner.spec.email, Group::Owners)
            .await
        {
            warn!(project_id = %project_id, error = %e, "failed to bind owner, removing project");
            if let Err(cleanup) = self.store.delete_project(&project_id).await {
                warn!(project_id = %project_id, error = %cleanup, "failed to remove project");
            }
            return Err(e);
        }

        info!(project_id = %project_id, name = %name, owner = %owner.spec.email, "created project");
        Ok(project)
    }

    pub async fn get(&self, id: &str) -> Result<Project> {
        self.store
            .get_project(id)
            .await?
            .ok_or_else(|| Error::not_found(&ResourceKind::Project.qualified(), id))
    }

    /// Projects `email` is a member of, in binding order
    pub async fn list_for_user(&self, email: &str) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for binding in self.bindings.list_for_user(email).await? {
            match self.store.get_project(&binding.spec.project_id).await? {
                Some(project) => projects.push(project),
                None => warn!(
                    project_id = %binding.spec.project_id,
                    binding = %binding.name_any(),
                    "binding refers to a missing project"
                ),
            }
        }
        Ok(projects)
    }

    /// Delete the project together with all of its bindings
    pub async fn delete(&self, id: &str) -> Result<()> {
        let project = self.get(id).await?;

        for binding in self.bindings.list_for_project(id).await? {
            match self.store.delete_binding(&binding.name_any()).await {
                Ok(()) => {}
                // removed concurrently
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        self.store.delete_project(&project.name_any()).await?;
        info!(project_id = %id, "deleted project");
        Ok(())
    }

    /// Move the project to `Active`. A no-op when it already is.
    pub async fn activate(&self, id: &str) -> Result<Project> {
        let store = &self.store;
        retry_on_conflict(&self.retry, || async move {
            let mut project = store
                .get_project(id)
                .await?
                .ok_or_else(|| Error::not_found(&ResourceKind::Project.qualified(), id))?;
            if project.phase() == ProjectPhase::Active {
                return Ok(project);
            }
            project.status = Some(ProjectStatus {
                phase: ProjectPhase::Active,
            });
            let updated = store.update_project_status(project).await?;
            info!(project_id = %id, "project is active");
            Ok(updated)
        })
        .await
    }
}
