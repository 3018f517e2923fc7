//! Wire types served by the REST API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user as seen by API clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectGroup>,
}

/// Membership of a user in one project; `group` is the bare prefix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGroup {
    pub id: String,
    #[serde(rename = "group")]
    pub group_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub creation_timestamp: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub spec: NodeSpec,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Provider specific settings, keyed by provider name
    #[serde(default)]
    pub cloud: Map<String, Value>,
    #[serde(default)]
    pub operating_system: Map<String, Value>,
    #[serde(default)]
    pub versions: NodeVersionInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVersionInfo {
    #[serde(default)]
    pub kubelet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub capacity: NodeResources,
    #[serde(default)]
    pub allocatable: NodeResources,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResources {
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeployment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creation_timestamp: DateTime<Utc>,
    pub spec: NodeDeploymentSpec,
    #[serde(default)]
    pub status: NodeDeploymentStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDeploymentSpec {
    pub replicas: i32,
    pub template: NodeSpec,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeploymentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_replicas: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_without_projects_omits_field() {
        let user = User {
            id: "abc".to_string(),
            name: "john".to_string(),
            email: "john@acme.com".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("projects").is_none());
        assert_eq!(json["creationTimestamp"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_user_request_parses_partial_body() {
        let user: User = serde_json::from_str(
            r#"{"email":"bob@acme.com", "projects":[{"id":"plan9-ID", "group":"editors"}]}"#,
        )
        .unwrap();
        assert_eq!(user.email, "bob@acme.com");
        assert_eq!(user.projects[0].group_prefix, "editors");
        assert!(user.id.is_empty());
    }
}
