//! Rules governing membership changes.
//!
//! All checks run before any write so a rejected request leaves the store
//! untouched. Checks are applied in a fixed order and the first violation
//! wins.

use crate::crd::UserProjectBinding;
use kubermatic_common::{emails_match, Error, Group, Result};

/// A membership change requested by `caller_email` on `target_email`
#[derive(Debug, Clone, Copy)]
pub struct MembershipRequest<'a> {
    pub caller_email: &'a str,
    pub target_email: &'a str,
    /// Project the request is scoped to
    pub project_id: &'a str,
    /// Project named in the request body
    pub requested_project: &'a str,
    pub requested_group: &'a str,
}

impl MembershipRequest<'_> {
    fn targets_caller(&self) -> bool {
        emails_match(self.caller_email, self.target_email)
    }
}

fn check_group(group: &str) -> Result<Group> {
    let group: Group = group.parse()?;
    if group == Group::Owners {
        return Err(Error::Forbidden(
            "the given user cannot be assigned to owners group".to_string(),
        ));
    }
    Ok(group)
}

fn check_common(req: &MembershipRequest<'_>) -> Result<Group> {
    let group = check_group(req.requested_group)?;

    if req.targets_caller() {
        return Err(Error::Forbidden(
            "you cannot assign yourself to a different group".to_string(),
        ));
    }

    if req.requested_project != req.project_id {
        return Err(Error::Forbidden(format!(
            "you can only assign the user to {} project",
            req.project_id
        )));
    }

    Ok(group)
}

/// Validate an invitation; `existing` is the target's current binding in
/// the project
pub fn check_add(req: &MembershipRequest<'_>, existing: Option<&UserProjectBinding>) -> Result<Group> {
    let group = check_common(req)?;

    if existing.is_some() {
        return Err(Error::Conflict(format!(
            "cannot add the user = {} to the project {} because user is already in the project",
            req.target_email, req.project_id
        )));
    }

    Ok(group)
}

/// Validate a group change of an existing member
pub fn check_edit(req: &MembershipRequest<'_>, existing: Option<&UserProjectBinding>) -> Result<Group> {
    let group = check_common(req)?;

    if existing.is_none() {
        return Err(Error::BadRequest(format!(
            "cannot change the membership of the user = {} for the project {} because the user is not a member of the project",
            req.target_email, req.project_id
        )));
    }

    Ok(group)
}

/// Validate removing `target_email` from `project_id`
pub fn check_delete(
    caller_email: &str,
    target_email: &str,
    project_id: &str,
    existing: Option<&UserProjectBinding>,
) -> Result<()> {
    if emails_match(caller_email, target_email) {
        return Err(Error::Forbidden(
            "you cannot delete yourself from the project".to_string(),
        ));
    }

    if existing.is_none() {
        return Err(Error::BadRequest(format!(
            "cannot delete the user = {} from the project {} because the user is not a member of the project",
            target_email, project_id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::UserProjectBindingSpec;

    fn request<'a>(target: &'a str, project: &'a str, group: &'a str) -> MembershipRequest<'a> {
        MembershipRequest {
            caller_email: "john@acme.com",
            target_email: target,
            project_id: "plan9-ID",
            requested_project: project,
            requested_group: group,
        }
    }

    fn bob_binding() -> UserProjectBinding {
        UserProjectBinding::new(
            "plan9-ID-bob@acme.com-viewers",
            UserProjectBindingSpec {
                user_email: "bob@acme.com".to_string(),
                project_id: "plan9-ID".to_string(),
                group: "viewers-plan9-ID".to_string(),
            },
        )
    }

    #[test]
    fn test_valid_invitation() {
        let group = check_add(&request("bob@acme.com", "plan9-ID", "editors"), None).unwrap();
        assert_eq!(group, Group::Editors);
    }

    #[test]
    fn test_invalid_group_is_checked_first() {
        let err = check_add(&request("john@acme.com", "moby", "admins"), None).unwrap_err();
        assert_eq!(err, Error::InvalidInput("invalid group name admins".to_string()));
    }

    #[test]
    fn test_owners_cannot_be_assigned() {
        let err = check_edit(&request("bob@acme.com", "plan9-ID", "owners"), Some(&bob_binding()))
            .unwrap_err();
        assert_eq!(
            err,
            Error::Forbidden("the given user cannot be assigned to owners group".to_string())
        );
    }

    #[test]
    fn test_caller_cannot_change_own_group() {
        let err = check_add(&request("John@acme.com", "plan9-ID", "editors"), None).unwrap_err();
        assert_eq!(
            err,
            Error::Forbidden("you cannot assign yourself to a different group".to_string())
        );
    }

    #[test]
    fn test_self_detection_folds_non_ascii_case() {
        let req = MembershipRequest {
            caller_email: "ärger@acme.com",
            target_email: "Ärger@acme.com",
            project_id: "plan9-ID",
            requested_project: "plan9-ID",
            requested_group: "editors",
        };
        assert!(matches!(check_add(&req, None), Err(Error::Forbidden(_))));

        let err = check_delete("ärger@acme.com", "ÄRGER@acme.com", "plan9-ID", None).unwrap_err();
        assert_eq!(
            err,
            Error::Forbidden("you cannot delete yourself from the project".to_string())
        );
    }

    #[test]
    fn test_project_must_match_context() {
        let err = check_add(&request("bob@acme.com", "moby", "editors"), None).unwrap_err();
        assert_eq!(
            err,
            Error::Forbidden("you can only assign the user to plan9-ID project".to_string())
        );
    }

    #[test]
    fn test_duplicate_invitation_uses_request_email() {
        let binding = bob_binding();
        let err = check_add(&request("Bob@acme.com", "plan9-ID", "editors"), Some(&binding))
            .unwrap_err();
        assert_eq!(
            err,
            Error::Conflict(
                "cannot add the user = Bob@acme.com to the project plan9-ID because user is already in the project"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_edit_non_member() {
        let err = check_edit(&request("bob@acme.com", "plan9-ID", "editors"), None).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert!(err.to_string().contains("because the user is not a member of the project"));
    }

    #[test]
    fn test_delete_rules() {
        let err = check_delete("john@acme.com", "JOHN@acme.com", "plan9-ID", None).unwrap_err();
        assert_eq!(
            err,
            Error::Forbidden("you cannot delete yourself from the project".to_string())
        );

        let err = check_delete("john@acme.com", "bob@acme.com", "plan9-ID", None).unwrap_err();
        assert_eq!(
            err,
            Error::BadRequest(
                "cannot delete the user = bob@acme.com from the project plan9-ID because the user is not a member of the project"
                    .to_string()
            )
        );

        assert!(check_delete("john@acme.com", "bob@acme.com", "plan9-ID", Some(&bob_binding())).is_ok());
    }
}
