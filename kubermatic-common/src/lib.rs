//! Common types and utilities shared between kubermatic-api and its clients

pub mod api;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Prefix of the owners group
pub const OWNER_GROUP_NAME_PREFIX: &str = "owners";
/// Prefix of the editors group
pub const EDITOR_GROUP_NAME_PREFIX: &str = "editors";
/// Prefix of the viewers group
pub const VIEWER_GROUP_NAME_PREFIX: &str = "viewers";

/// Membership group of a user inside a project.
///
/// Groups are ranked `owners > editors > viewers`; a binding stores the
/// group as `"<prefix>-<projectID>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Owners,
    Editors,
    Viewers,
}

impl Group {
    /// All groups, highest rank first
    pub const ALL: [Group; 3] = [Group::Owners, Group::Editors, Group::Viewers];

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Owners => OWNER_GROUP_NAME_PREFIX,
            Group::Editors => EDITOR_GROUP_NAME_PREFIX,
            Group::Viewers => VIEWER_GROUP_NAME_PREFIX,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Group::Owners => 3,
            Group::Editors => 2,
            Group::Viewers => 1,
        }
    }

    /// Whether this group carries at least the privileges of `other`
    pub fn covers(&self, other: Group) -> bool {
        self.rank() >= other.rank()
    }

    /// Group name bound to a project, e.g. `editors-plan9-ID`
    pub fn group_name(&self, project_id: &str) -> String {
        format!("{}-{}", self.as_str(), project_id)
    }

    /// Recover the group from a stored group name.
    ///
    /// The project suffix is stripped when it matches; otherwise the
    /// leading prefix up to the first `-` is used.
    pub fn from_group_name(group_name: &str, project_id: &str) -> Option<Group> {
        let suffix = format!("-{}", project_id);
        let prefix = match group_name.strip_suffix(&suffix) {
            Some(prefix) => prefix,
            None => group_name.split('-').next().unwrap_or_default(),
        };
        prefix.parse().ok()
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Group {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            OWNER_GROUP_NAME_PREFIX => Ok(Group::Owners),
            EDITOR_GROUP_NAME_PREFIX => Ok(Group::Editors),
            VIEWER_GROUP_NAME_PREFIX => Ok(Group::Viewers),
            other => Err(Error::InvalidInput(format!("invalid group name {}", other))),
        }
    }
}

/// Lifecycle phase of a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ProjectPhase {
    /// RBAC for the project has been generated
    Active,
    /// Newly created, waiting for the RBAC controller
    #[default]
    Inactive,
    Terminating,
}

impl fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectPhase::Active => "Active",
            ProjectPhase::Inactive => "Inactive",
            ProjectPhase::Terminating => "Terminating",
        };
        f.write_str(s)
    }
}

/// Stable user identifier: hex encoded sha256 of the lower-cased email
pub fn user_id_for_email(email: &str) -> String {
    let digest = Sha256::digest(email.to_lowercase().as_bytes());
    hex::encode(digest)
}

/// Whether two addresses name the same user. Uses the same Unicode
/// lower-casing as [`user_id_for_email`] and [`binding_name`].
pub fn emails_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Deterministic UserProjectBinding name, `<projectID>-<email>-<groupPrefix>`
pub fn binding_name(project_id: &str, email: &str, group: Group) -> String {
    format!("{}-{}-{}", project_id, email.to_lowercase(), group.as_str())
}

/// Error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    BadRequest(String),

    /// The request collides with existing membership state
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },

    /// Optimistic concurrency failure, safe to retry after a fresh read
    #[error("Operation cannot be fulfilled on {kind} \"{name}\": the object has been modified; please apply your changes to the latest version and try again")]
    ResourceConflict { kind: String, name: String },

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: &str, name: &str) -> Self {
        Error::NotFound(format!("{} \"{}\" not found", kind, name))
    }

    pub fn is_resource_conflict(&self) -> bool {
        matches!(self, Error::ResourceConflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_is_sha256_of_lowercase_email() {
        assert_eq!(
            user_id_for_email("bob@acme.com"),
            "405ac8384fa984f787f9486daf34d84d98f20c4d6a12e2cc4ed89be3bcb06ad6"
        );
        assert_eq!(user_id_for_email("BOB@ACME.COM"), user_id_for_email("bob@acme.com"));
        assert_eq!(
            user_id_for_email("john@acme.com"),
            "4b2d8785b49bad23638b17d8db76857a79bf79441241a78a97d88cc64bbf766e"
        );
    }

    #[test]
    fn test_binding_name_lowercases_email() {
        assert_eq!(
            binding_name("plan9-ID", "Bob@Acme.com", Group::Editors),
            "plan9-ID-bob@acme.com-editors"
        );
    }

    #[test]
    fn test_emails_match_non_ascii_case() {
        assert!(emails_match("Ärger@acme.com", "ärger@acme.com"));
        assert!(emails_match("BOB@acme.com", "bob@ACME.com"));
        assert!(!emails_match("bob@acme.com", "bobby@acme.com"));
        assert_eq!(user_id_for_email("Ärger@acme.com"), user_id_for_email("ärger@acme.com"));
    }

    #[test]
    fn test_group_parsing() {
        assert_eq!("owners".parse::<Group>().unwrap(), Group::Owners);
        assert_eq!("viewers".parse::<Group>().unwrap(), Group::Viewers);

        let err = "admins".parse::<Group>().unwrap_err();
        assert_eq!(err, Error::InvalidInput("invalid group name admins".to_string()));
    }

    #[test]
    fn test_group_rank() {
        assert!(Group::Owners.covers(Group::Editors));
        assert!(Group::Editors.covers(Group::Viewers));
        assert!(Group::Editors.covers(Group::Editors));
        assert!(!Group::Viewers.covers(Group::Editors));
    }

    #[test]
    fn test_group_name_round_trip_with_dashed_project() {
        let name = Group::Editors.group_name("my-third-project-ID");
        assert_eq!(name, "editors-my-third-project-ID");
        assert_eq!(
            Group::from_group_name(&name, "my-third-project-ID"),
            Some(Group::Editors)
        );
        assert_eq!(Group::from_group_name("owners-other", "plan9-ID"), Some(Group::Owners));
        assert_eq!(Group::from_group_name("admins-plan9-ID", "plan9-ID"), None);
    }
}
