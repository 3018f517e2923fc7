//! In-memory store
//!
//! Read-after-write consistent (single lock), assigns UIDs, creation
//! timestamps and resource versions the way the API server does, records
//! every mutating call and broadcasts change events.

use super::{ResourceKind, Store, StoreEvent};
use crate::crd::{Cluster, Project, User, UserProjectBinding};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use kubermatic_common::{Error, Result};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// A mutating call observed by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAction {
    pub verb: &'static str,
    pub resource: &'static str,
    pub name: String,
}

impl StoreAction {
    pub fn matches(&self, verb: &str, resource: &str) -> bool {
        self.verb == verb && self.resource == resource
    }
}

struct Entry<T> {
    seq: u64,
    object: T,
}

#[derive(Default)]
struct Inner {
    seq: u64,
    users: HashMap<String, Entry<User>>,
    projects: HashMap<String, Entry<Project>>,
    bindings: HashMap<String, Entry<UserProjectBinding>>,
    clusters: HashMap<String, Entry<Cluster>>,
    actions: Vec<StoreAction>,
}

impl Inner {
    fn record(&mut self, verb: &'static str, kind: ResourceKind, name: &str) {
        self.actions.push(StoreAction {
            verb,
            resource: kind.plural(),
            name: name.to_string(),
        });
    }
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    /// Receive change events for every successful write
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Mutating calls made so far, oldest first
    pub async fn actions(&self) -> Vec<StoreAction> {
        self.inner.read().await.actions.clone()
    }

    pub async fn clear_actions(&self) {
        self.inner.write().await.actions.clear();
    }

    fn publish(&self, kind: ResourceKind, name: &str, project_id: Option<String>, deleted: bool) {
        // no receivers is fine
        let _ = self.events.send(StoreEvent {
            kind,
            name: name.to_string(),
            project_id,
            deleted,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn insert<T>(
    map: &mut HashMap<String, Entry<T>>,
    seq: &mut u64,
    kind: ResourceKind,
    mut obj: T,
) -> Result<T>
where
    T: Resource + Clone,
{
    let name = obj.meta().name.clone().unwrap_or_default();
    if name.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{}: metadata.name is required",
            kind.qualified()
        )));
    }
    if map.contains_key(&name) {
        return Err(Error::AlreadyExists {
            kind: kind.qualified(),
            name,
        });
    }

    *seq += 1;
    let meta = obj.meta_mut();
    meta.uid.get_or_insert_with(|| uuid::Uuid::new_v4().to_string());
    meta.creation_timestamp.get_or_insert_with(|| Time(Utc::now()));
    meta.resource_version = Some(seq.to_string());

    map.insert(
        name,
        Entry {
            seq: *seq,
            object: obj.clone(),
        },
    );
    Ok(obj)
}

fn replace<T, F>(
    map: &mut HashMap<String, Entry<T>>,
    seq: &mut u64,
    kind: ResourceKind,
    obj: T,
    merge: F,
) -> Result<T>
where
    T: Resource + Clone,
    F: FnOnce(&mut T, T),
{
    let name = obj.name_any();
    let entry = map
        .get_mut(&name)
        .ok_or_else(|| Error::not_found(&kind.qualified(), &name))?;

    if let Some(rv) = obj.meta().resource_version.as_deref() {
        if entry.object.meta().resource_version.as_deref() != Some(rv) {
            return Err(Error::ResourceConflict {
                kind: kind.qualified(),
                name,
            });
        }
    }

    *seq += 1;
    merge(&mut entry.object, obj);
    entry.object.meta_mut().resource_version = Some(seq.to_string());
    Ok(entry.object.clone())
}

fn sorted<T: Clone>(map: &HashMap<String, Entry<T>>) -> Vec<T> {
    let mut entries: Vec<&Entry<T>> = map.values().collect();
    entries.sort_by_key(|e| e.seq);
    entries.into_iter().map(|e| e.object.clone()).collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(id).map(|e| e.object.clone()))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(sorted(&self.inner.read().await.users))
    }

    async fn create_user(&self, user: User) -> Result<User> {
        let created = {
            let mut inner = self.inner.write().await;
            let Inner { users, seq, .. } = &mut *inner;
            let created = insert(users, seq, ResourceKind::User, user)?;
            inner.record("create", ResourceKind::User, &created.name_any());
            created
        };
        debug!(user = %created.name_any(), "user created");
        self.publish(ResourceKind::User, &created.name_any(), None, false);
        Ok(created)
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let inner = self.inner.read().await;
        Ok(inner.projects.get(id).map(|e| e.object.clone()))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(sorted(&self.inner.read().await.projects))
    }

    async fn create_project(&self, project: Project) -> Result<Project> {
        let created = {
            let mut inner = self.inner.write().await;
            let Inner { projects, seq, .. } = &mut *inner;
            let created = insert(projects, seq, ResourceKind::Project, project)?;
            inner.record("create", ResourceKind::Project, &created.name_any());
            created
        };
        let name = created.name_any();
        self.publish(ResourceKind::Project, &name, Some(name.clone()), false);
        Ok(created)
    }

    async fn update_project_status(&self, project: Project) -> Result<Project> {
        let updated = {
            let mut inner = self.inner.write().await;
            let Inner { projects, seq, .. } = &mut *inner;
            let updated = replace(projects, seq, ResourceKind::Project, project, |stored, new| {
                stored.status = new.status;
            })?;
            inner.record("update", ResourceKind::Project, &updated.name_any());
            updated
        };
        let name = updated.name_any();
        self.publish(ResourceKind::Project, &name, Some(name.clone()), false);
        Ok(updated)
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            if inner.projects.remove(id).is_none() {
                return Err(Error::not_found(&ResourceKind::Project.qualified(), id));
            }
            inner.record("delete", ResourceKind::Project, id);
        }
        self.publish(ResourceKind::Project, id, Some(id.to_string()), true);
        Ok(())
    }

    async fn get_binding(&self, name: &str) -> Result<Option<UserProjectBinding>> {
        let inner = self.inner.read().await;
        Ok(inner.bindings.get(name).map(|e| e.object.clone()))
    }

    async fn list_bindings(&self) -> Result<Vec<UserProjectBinding>> {
        Ok(sorted(&self.inner.read().await.bindings))
    }

    async fn create_binding(&self, binding: UserProjectBinding) -> Result<UserProjectBinding> {
        let created = {
            let mut inner = self.inner.write().await;
            let Inner { bindings, seq, .. } = &mut *inner;
            let created = insert(bindings, seq, ResourceKind::UserProjectBinding, binding)?;
            inner.record("create", ResourceKind::UserProjectBinding, &created.name_any());
            created
        };
        self.publish(
            ResourceKind::UserProjectBinding,
            &created.name_any(),
            Some(created.spec.project_id.clone()),
            false,
        );
        Ok(created)
    }

    async fn update_binding(&self, binding: UserProjectBinding) -> Result<UserProjectBinding> {
        let updated = {
            let mut inner = self.inner.write().await;
            let Inner { bindings, seq, .. } = &mut *inner;
            let updated = replace(
                bindings,
                seq,
                ResourceKind::UserProjectBinding,
                binding,
                |stored, new| {
                    stored.spec = new.spec;
                    stored.metadata.labels = new.metadata.labels;
                    stored.metadata.annotations = new.metadata.annotations;
                },
            )?;
            inner.record("update", ResourceKind::UserProjectBinding, &updated.name_any());
            updated
        };
        self.publish(
            ResourceKind::UserProjectBinding,
            &updated.name_any(),
            Some(updated.spec.project_id.clone()),
            false,
        );
        Ok(updated)
    }

    async fn delete_binding(&self, name: &str) -> Result<()> {
        let removed = {
            let mut inner = self.inner.write().await;
            let removed = inner.bindings.remove(name).ok_or_else(|| {
                Error::not_found(&ResourceKind::UserProjectBinding.qualified(), name)
            })?;
            inner.record("delete", ResourceKind::UserProjectBinding, name);
            removed.object
        };
        self.publish(
            ResourceKind::UserProjectBinding,
            name,
            Some(removed.spec.project_id),
            true,
        );
        Ok(())
    }

    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>> {
        let inner = self.inner.read().await;
        Ok(inner.clusters.get(id).map(|e| e.object.clone()))
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        Ok(sorted(&self.inner.read().await.clusters))
    }

    async fn create_cluster(&self, cluster: Cluster) -> Result<Cluster> {
        let created = {
            let mut inner = self.inner.write().await;
            let Inner { clusters, seq, .. } = &mut *inner;
            let created = insert(clusters, seq, ResourceKind::Cluster, cluster)?;
            inner.record("create", ResourceKind::Cluster, &created.name_any());
            created
        };
        self.publish(
            ResourceKind::Cluster,
            &created.name_any(),
            created.project_id().map(String::from),
            false,
        );
        Ok(created)
    }
}
