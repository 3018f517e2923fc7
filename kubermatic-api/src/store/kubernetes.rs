//! Store backed by the kubermatic.k8c.io CRDs
//!
//! Binding names contain the user's email, which is not a valid object
//! name. Such names are stored under a hashed object name and the logical
//! name is kept in an annotation.

use super::{ResourceKind, Store};
use crate::crd::{Cluster, Project, User, UserProjectBinding};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use kubermatic_common::{Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::sync::LazyLock;

/// Annotation holding the logical binding name when it had to be hashed
pub const BINDING_NAME_ANNOTATION: &str = "kubermatic.k8c.io/binding-name";

static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// Sort key for "oldest first". Creation timestamps have one-second
/// resolution, so ties fall back to the resourceVersion, which the API
/// server (etcd) assigns from a monotonically increasing revision.
/// Non-numeric versions sort last, then by name.
fn creation_order<K: Resource>(obj: &K) -> (Option<chrono::DateTime<chrono::Utc>>, u64, String) {
    let meta = obj.meta();
    let revision = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(u64::MAX);
    (
        meta.creation_timestamp.as_ref().map(|t| t.0),
        revision,
        obj.name_any(),
    )
}

/// Map a logical name onto a valid object name. Valid names are kept,
/// others become `upb-<sha256 of the name>`.
pub fn object_name_for(name: &str) -> String {
    if name.len() <= 253 && DNS1123_SUBDOMAIN.is_match(name) {
        name.to_string()
    } else {
        format!("upb-{}", hex::encode(Sha256::digest(name.as_bytes())))
    }
}

/// Translate a kube client error into the store error taxonomy
pub fn map_kube_error(kind: ResourceKind, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) => match (resp.code, resp.reason.as_str()) {
            (404, _) => Error::not_found(&kind.qualified(), name),
            (409, "AlreadyExists") => Error::AlreadyExists {
                kind: kind.qualified(),
                name: name.to_string(),
            },
            (409, _) => Error::ResourceConflict {
                kind: kind.qualified(),
                name: name.to_string(),
            },
            (401, _) => Error::Unauthorized(resp.message),
            (403, _) => Error::Forbidden(resp.message),
            (422, _) | (400, _) => Error::BadRequest(resp.message),
            _ => Error::Internal(format!("Kubernetes API error: {}", resp.message)),
        },
        other => Error::Internal(format!("Kubernetes client error: {}", other)),
    }
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope, DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }

    async fn get_opt<K>(&self, kind: ResourceKind, name: &str) -> Result<Option<K>>
    where
        K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        self.api::<K>()
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(kind, name, e))
    }

    async fn list<K>(&self, kind: ResourceKind) -> Result<Vec<K>>
    where
        K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let mut items = self
            .api::<K>()
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(kind, "", e))?
            .items;
        items.sort_by_key(|o| creation_order(o));
        Ok(items)
    }

    async fn create<K>(&self, kind: ResourceKind, obj: &K) -> Result<K>
    where
        K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + serde::Serialize
            + Debug,
    {
        let name = obj.name_any();
        self.api::<K>()
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error(kind, &name, e))
    }

    async fn delete<K>(&self, kind: ResourceKind, name: &str) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        self.api::<K>()
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_kube_error(kind, name, e))?;
        Ok(())
    }
}

fn to_stored_binding(mut binding: UserProjectBinding) -> UserProjectBinding {
    let logical = binding.name_any();
    let object_name = object_name_for(&logical);
    if object_name != logical {
        binding
            .annotations_mut()
            .insert(BINDING_NAME_ANNOTATION.to_string(), logical);
        binding.metadata.name = Some(object_name);
    }
    binding
}

fn from_stored_binding(mut binding: UserProjectBinding) -> UserProjectBinding {
    if let Some(logical) = binding.annotations().get(BINDING_NAME_ANNOTATION).cloned() {
        binding.metadata.name = Some(logical);
    }
    binding
}

#[async_trait]
impl Store for KubeStore {
    async fn ping(&self) -> Result<()> {
        self.api::<Project>()
            .list_metadata(&ListParams::default().limit(1))
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(ResourceKind::Project, "", e))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.get_opt(ResourceKind::User, id).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.list(ResourceKind::User).await
    }

    async fn create_user(&self, user: User) -> Result<User> {
        self.create(ResourceKind::User, &user).await
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.get_opt(ResourceKind::Project, id).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.list(ResourceKind::Project).await
    }

    async fn create_project(&self, project: Project) -> Result<Project> {
        self.create(ResourceKind::Project, &project).await
    }

    async fn update_project_status(&self, project: Project) -> Result<Project> {
        let name = project.name_any();
        // resourceVersion in a merge patch makes the write conditional
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": project.metadata.resource_version },
            "status": project.status,
        });
        self.api::<Project>()
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error(ResourceKind::Project, &name, e))
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.delete::<Project>(ResourceKind::Project, id).await
    }

    async fn get_binding(&self, name: &str) -> Result<Option<UserProjectBinding>> {
        let stored: Option<UserProjectBinding> = self
            .get_opt(ResourceKind::UserProjectBinding, &object_name_for(name))
            .await?;
        Ok(stored.map(from_stored_binding))
    }

    async fn list_bindings(&self) -> Result<Vec<UserProjectBinding>> {
        let bindings: Vec<UserProjectBinding> =
            self.list(ResourceKind::UserProjectBinding).await?;
        Ok(bindings.into_iter().map(from_stored_binding).collect())
    }

    async fn create_binding(&self, binding: UserProjectBinding) -> Result<UserProjectBinding> {
        let logical = binding.name_any();
        let created = self
            .create(ResourceKind::UserProjectBinding, &to_stored_binding(binding))
            .await
            .map_err(|e| match e {
                Error::AlreadyExists { kind, .. } => Error::AlreadyExists {
                    kind,
                    name: logical.clone(),
                },
                other => other,
            })?;
        Ok(from_stored_binding(created))
    }

    async fn update_binding(&self, binding: UserProjectBinding) -> Result<UserProjectBinding> {
        let logical = binding.name_any();
        let stored = to_stored_binding(binding);
        let object_name = stored.name_any();
        let updated = self
            .api::<UserProjectBinding>()
            .replace(&object_name, &PostParams::default(), &stored)
            .await
            .map_err(|e| map_kube_error(ResourceKind::UserProjectBinding, &logical, e))?;
        Ok(from_stored_binding(updated))
    }

    async fn delete_binding(&self, name: &str) -> Result<()> {
        self.delete::<UserProjectBinding>(ResourceKind::UserProjectBinding, &object_name_for(name))
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => {
                    Error::not_found(&ResourceKind::UserProjectBinding.qualified(), name)
                }
                other => other,
            })
    }

    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>> {
        self.get_opt(ResourceKind::Cluster, id).await
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        self.list(ResourceKind::Cluster).await
    }

    async fn create_cluster(&self, cluster: Cluster) -> Result<Cluster> {
        self.create(ResourceKind::Cluster, &cluster).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::UserProjectBindingSpec;

    #[test]
    fn test_same_second_objects_keep_creation_order() {
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

        let created = Time(chrono::Utc::now());
        let stored = |name: &str, version: &str| {
            let mut binding = UserProjectBinding::new(name, UserProjectBindingSpec::default());
            binding.metadata.creation_timestamp = Some(created.clone());
            binding.metadata.resource_version = Some(version.to_string());
            binding
        };
        // hashed names would sort the other way round
        let mut items = vec![
            stored("upb-ffff", "1200"),
            stored("upb-0000", "1201"),
            stored("upb-aaaa", "999"),
        ];
        items.sort_by_key(|o| creation_order(o));

        let names: Vec<String> = items.iter().map(|b| b.name_any()).collect();
        assert_eq!(names, vec!["upb-aaaa", "upb-ffff", "upb-0000"]);
    }

    #[tokio::test]
    async fn test_ping_fetches_one_project() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let service = tower::service_fn(move |req: axum::http::Request<kube::client::Body>| {
            recorder.lock().unwrap().push(req.uri().to_string());
            async move {
                let list = serde_json::json!({
                    "apiVersion": "meta.k8s.io/v1",
                    "kind": "PartialObjectMetadataList",
                    "metadata": {"resourceVersion": "1"},
                    "items": [],
                });
                let body = kube::client::Body::from(serde_json::to_vec(&list).unwrap());
                Ok::<_, std::convert::Infallible>(axum::http::Response::new(body))
            }
        });
        let store = KubeStore::new(Client::new(service, "default"));

        store.ping().await.unwrap();

        let uris = seen.lock().unwrap().clone();
        assert_eq!(uris.len(), 1);
        assert!(uris[0].contains("/projects?"), "{}", uris[0]);
        assert!(uris[0].contains("limit=1"), "{}", uris[0]);
    }

    #[test]
    fn test_object_name_keeps_valid_names() {
        assert_eq!(object_name_for("plan9-id"), "plan9-id");
    }

    #[test]
    fn test_object_name_hashes_emails() {
        let name = object_name_for("plan9-ID-bob@acme.com-editors");
        assert!(name.starts_with("upb-"));
        assert_eq!(name.len(), 4 + 64);
        assert!(DNS1123_SUBDOMAIN.is_match(&name));
    }

    #[test]
    fn test_binding_name_survives_storage() {
        let binding = UserProjectBinding::new(
            "plan9-ID-bob@acme.com-editors",
            UserProjectBindingSpec {
                user_email: "bob@acme.com".to_string(),
                project_id: "plan9-ID".to_string(),
                group: "editors-plan9-ID".to_string(),
            },
        );
        let stored = to_stored_binding(binding);
        assert!(stored.name_any().starts_with("upb-"));
        assert_eq!(
            stored.annotations().get(BINDING_NAME_ANNOTATION).map(String::as_str),
            Some("plan9-ID-bob@acme.com-editors")
        );
        assert_eq!(from_stored_binding(stored).name_any(), "plan9-ID-bob@acme.com-editors");
    }

    #[test]
    fn test_map_kube_error() {
        let err = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "exists".to_string(),
            reason: "AlreadyExists".to_string(),
            code: 409,
        });
        assert!(map_kube_error(ResourceKind::User, "abc", err).is_already_exists());

        let err = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        });
        assert!(map_kube_error(ResourceKind::Project, "p", err).is_resource_conflict());
    }
}
