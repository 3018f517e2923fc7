//! Project membership operations
//!
//! Every operation authorizes the caller first, then runs the group policy
//! checks, and only then touches the binding store.

use crate::authz::{AuthorizationGate, Operation};
use crate::bindings::BindingStore;
use crate::crd::{User, UserProjectBinding};
use crate::identity::IdentityResolver;
use crate::policy::{self, MembershipRequest};
use crate::projects::ProjectManager;
use crate::validation;
use kubermatic_common::{api, user_id_for_email, Error, Group, Result};
use kube::ResourceExt;
use tracing::info;

/// Wire representation of `user` with the given memberships
pub fn to_api_user(user: &User, projects: Vec<api::ProjectGroup>) -> api::User {
    api::User {
        id: user.name_any(),
        name: user.spec.name.clone(),
        creation_timestamp: user
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or_default(),
        email: user.spec.email.clone(),
        projects,
    }
}

/// Wire representation of a member who never logged in
fn unregistered_user(email: &str, projects: Vec<api::ProjectGroup>) -> api::User {
    api::User {
        id: user_id_for_email(email),
        email: email.to_string(),
        projects,
        ..Default::default()
    }
}

fn project_group(binding: &UserProjectBinding) -> api::ProjectGroup {
    let group_prefix = Group::from_group_name(&binding.spec.group, &binding.spec.project_id)
        .map(|g| g.as_str().to_string())
        .unwrap_or_else(|| binding.spec.group.clone());
    api::ProjectGroup {
        id: binding.spec.project_id.clone(),
        group_prefix,
    }
}

/// The single project entry of an add or edit request
fn requested_membership(body: &api::User) -> Result<&api::ProjectGroup> {
    match body.projects.as_slice() {
        [membership] => Ok(membership),
        other => Err(Error::BadRequest(format!(
            "expected exactly one entry in \"projects\" field, but received {}",
            other.len()
        ))),
    }
}

#[derive(Clone)]
pub struct MembershipService {
    identity: IdentityResolver,
    bindings: BindingStore,
    projects: ProjectManager,
    gate: AuthorizationGate,
}

impl MembershipService {
    pub fn new(
        identity: IdentityResolver,
        bindings: BindingStore,
        projects: ProjectManager,
        gate: AuthorizationGate,
    ) -> Self {
        Self {
            identity,
            bindings,
            projects,
            gate,
        }
    }

    async fn member(&self, binding: &UserProjectBinding) -> Result<api::User> {
        let projects = vec![project_group(binding)];
        Ok(match self.identity.user_by_email(&binding.spec.user_email).await? {
            Some(user) => to_api_user(&user, projects),
            None => unregistered_user(&binding.spec.user_email, projects),
        })
    }

    /// Email of the member identified by `user_id`, if it can be resolved
    async fn member_email(&self, project_id: &str, user_id: &str) -> Result<Option<String>> {
        if let Some(user) = self.identity.user_by_id(user_id).await? {
            return Ok(Some(user.spec.email));
        }
        Ok(self
            .bindings
            .list_for_project(project_id)
            .await?
            .into_iter()
            .find(|b| user_id_for_email(&b.spec.user_email) == user_id)
            .map(|b| b.spec.user_email))
    }

    /// Members of the project, each with this project as its only entry
    pub async fn list(&self, caller_email: &str, project_id: &str) -> Result<Vec<api::User>> {
        self.gate
            .authorize(caller_email, project_id, Operation::ListUsers)
            .await?;
        self.projects.get(project_id).await?;

        let mut users = Vec::new();
        for binding in self.bindings.list_for_project(project_id).await? {
            users.push(self.member(&binding).await?);
        }
        Ok(users)
    }

    /// Invite the user described by `body` into the project
    pub async fn add(
        &self,
        caller_email: &str,
        project_id: &str,
        body: &api::User,
    ) -> Result<api::User> {
        self.gate
            .authorize(caller_email, project_id, Operation::AddUser)
            .await?;
        let project = self.projects.get(project_id).await?;

        validation::validate_email(&body.email)?;
        let membership = requested_membership(body)?;
        let existing = self.bindings.find(project_id, &body.email).await?;
        let group = policy::check_add(
            &MembershipRequest {
                caller_email,
                target_email: &body.email,
                project_id,
                requested_project: &membership.id,
                requested_group: &membership.group_prefix,
            },
            existing.as_ref(),
        )?;

        let binding = self.bindings.create(&project, &body.email, group).await?;
        info!(
            project_id = %project_id,
            email = %body.email,
            group = %group,
            invited_by = %caller_email,
            "user added to project"
        );
        self.member(&binding).await
    }

    /// Move the member identified by `user_id` to the group named in `body`
    pub async fn edit(
        &self,
        caller_email: &str,
        project_id: &str,
        user_id: &str,
        body: &api::User,
    ) -> Result<api::User> {
        self.gate
            .authorize(caller_email, project_id, Operation::EditUser)
            .await?;
        self.projects.get(project_id).await?;

        let membership = requested_membership(body)?;
        let target_email = match self.member_email(project_id, user_id).await? {
            Some(email) => email,
            None => body.email.clone(),
        };
        let existing = self.bindings.find(project_id, &target_email).await?;
        let group = policy::check_edit(
            &MembershipRequest {
                caller_email,
                target_email: &target_email,
                project_id,
                requested_project: &membership.id,
                requested_group: &membership.group_prefix,
            },
            existing.as_ref(),
        )?;

        let binding = match existing {
            Some(binding) => self.bindings.update_group(&binding, group).await?,
            None => return Err(Error::not_found("userprojectbindings.kubermatic.k8c.io", user_id)),
        };
        info!(
            project_id = %project_id,
            email = %target_email,
            group = %group,
            changed_by = %caller_email,
            "user group changed"
        );
        self.member(&binding).await
    }

    /// Remove the member identified by `user_id` from the project
    pub async fn delete(&self, caller_email: &str, project_id: &str, user_id: &str) -> Result<()> {
        self.gate
            .authorize(caller_email, project_id, Operation::DeleteUser)
            .await?;
        self.projects.get(project_id).await?;

        let target_email = self
            .member_email(project_id, user_id)
            .await?
            .unwrap_or_else(|| user_id.to_string());
        let existing = self.bindings.find(project_id, &target_email).await?;
        policy::check_delete(caller_email, &target_email, project_id, existing.as_ref())?;

        self.bindings.delete(project_id, &target_email).await?;
        info!(
            project_id = %project_id,
            email = %target_email,
            removed_by = %caller_email,
            "user removed from project"
        );
        Ok(())
    }

    /// The caller with every project they belong to
    pub async fn me(&self, user: &User) -> Result<api::User> {
        let projects = self
            .bindings
            .list_for_user(&user.spec.email)
            .await?
            .iter()
            .map(project_group)
            .collect();
        Ok(to_api_user(user, projects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Project, ProjectSpec, UserSpec};
    use crate::retry::RetryPolicy;
    use crate::store::{MemoryStore, Store};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: MembershipService,
        bindings: BindingStore,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let retry = RetryPolicy::default();
        let identity = IdentityResolver::new(store.clone());
        let bindings = BindingStore::new(store.clone(), retry);
        let projects = ProjectManager::new(store.clone(), bindings.clone(), retry);
        let gate = AuthorizationGate::new(bindings.clone());

        let plan9 = store
            .create_project(Project::new(
                "plan9-ID",
                ProjectSpec {
                    name: "plan9".to_string(),
                },
            ))
            .await
            .unwrap();
        for (email, name) in [("john@acme.com", "john"), ("bob@acme.com", "Bob")] {
            store
                .create_user(User::new(
                    &user_id_for_email(email),
                    UserSpec {
                        name: name.to_string(),
                        email: email.to_string(),
                        is_admin: false,
                    },
                ))
                .await
                .unwrap();
        }
        bindings.create(&plan9, "john@acme.com", Group::Owners).await.unwrap();

        Fixture {
            store,
            service: MembershipService::new(identity, bindings.clone(), projects, gate),
            bindings,
        }
    }

    fn invite(email: &str, project: &str, group: &str) -> api::User {
        api::User {
            email: email.to_string(),
            projects: vec![api::ProjectGroup {
                id: project.to_string(),
                group_prefix: group.to_string(),
            }],
            ..Default::default()
        }
    }

    const BOB_ID: &str = "405ac8384fa984f787f9486daf34d84d98f20c4d6a12e2cc4ed89be3bcb06ad6";

    #[tokio::test]
    async fn test_add_returns_stored_user() {
        let f = fixture().await;
        let user = f
            .service
            .add("john@acme.com", "plan9-ID", &invite("BOB@ACME.COM", "plan9-ID", "editors"))
            .await
            .unwrap();

        assert_eq!(user.id, BOB_ID);
        assert_eq!(user.name, "Bob");
        assert_eq!(user.email, "bob@acme.com");
        assert_eq!(
            user.projects,
            vec![api::ProjectGroup {
                id: "plan9-ID".to_string(),
                group_prefix: "editors".to_string()
            }]
        );

        let stored = f.store.get_binding("plan9-ID-bob@acme.com-editors").await.unwrap();
        assert_eq!(stored.unwrap().spec.user_email, "bob@acme.com");
    }

    #[tokio::test]
    async fn test_add_unregistered_user() {
        let f = fixture().await;
        let user = f
            .service
            .add("john@acme.com", "plan9-ID", &invite("alice@acme.com", "plan9-ID", "viewers"))
            .await
            .unwrap();
        assert_eq!(user.id, user_id_for_email("alice@acme.com"));
        assert!(user.name.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_add_does_not_write() {
        let f = fixture().await;
        f.store.clear_actions().await;

        let err = f
            .service
            .add("john@acme.com", "plan9-ID", &invite("bob@acme.com", "plan9-ID", "owners"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let err = f
            .service
            .add("bob@acme.com", "plan9-ID", &invite("alice@acme.com", "plan9-ID", "viewers"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let mut body = invite("alice@acme.com", "plan9-ID", "viewers");
        body.projects.clear();
        let err = f.service.add("john@acme.com", "plan9-ID", &body).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        assert!(f.store.actions().await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_uses_stored_email() {
        let f = fixture().await;
        f.service
            .add("john@acme.com", "plan9-ID", &invite("bob@acme.com", "plan9-ID", "viewers"))
            .await
            .unwrap();

        let user = f
            .service
            .edit(
                "john@acme.com",
                "plan9-ID",
                BOB_ID,
                &invite("BOB@ACME.COM", "plan9-ID", "editors"),
            )
            .await
            .unwrap();
        assert_eq!(user.email, "bob@acme.com");
        assert_eq!(user.projects[0].group_prefix, "editors");

        let binding = f.bindings.find("plan9-ID", "bob@acme.com").await.unwrap().unwrap();
        assert_eq!(binding.name_any(), "plan9-ID-bob@acme.com-viewers");
        assert_eq!(binding.spec.group, "editors-plan9-ID");
    }

    #[tokio::test]
    async fn test_delete_by_path_id() {
        let f = fixture().await;
        f.service
            .add("john@acme.com", "plan9-ID", &invite("bob@acme.com", "plan9-ID", "editors"))
            .await
            .unwrap();

        f.service.delete("john@acme.com", "plan9-ID", BOB_ID).await.unwrap();
        assert!(f.bindings.find("plan9-ID", "bob@acme.com").await.unwrap().is_none());

        let err = f
            .service
            .delete("john@acme.com", "plan9-ID", BOB_ID)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::BadRequest(
                "cannot delete the user = bob@acme.com from the project plan9-ID because the user is not a member of the project"
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_owner_cannot_delete_self() {
        let f = fixture().await;
        let err = f
            .service
            .delete("john@acme.com", "plan9-ID", &user_id_for_email("john@acme.com"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::Forbidden("you cannot delete yourself from the project".to_string())
        );
    }

    #[tokio::test]
    async fn test_me_lists_all_projects() {
        let f = fixture().await;
        let john = f
            .store
            .get_user(&user_id_for_email("john@acme.com"))
            .await
            .unwrap()
            .unwrap();
        let me = f.service.me(&john).await.unwrap();
        assert_eq!(me.projects.len(), 1);
        assert_eq!(me.projects[0].group_prefix, "owners");

        let bob = f.store.get_user(BOB_ID).await.unwrap().unwrap();
        assert!(f.service.me(&bob).await.unwrap().projects.is_empty());
    }
}
