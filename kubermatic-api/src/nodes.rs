//! Node and node deployment operations of a user cluster
//!
//! The machine layer is reached through [`NodeProvider`]. This module only
//! decides whether the caller may act on the cluster and whether the
//! cluster is ready for the change.

use crate::authz::{AuthorizationGate, Operation};
use crate::crd::Cluster;
use crate::store::memory::StoreAction;
use crate::store::{ResourceKind, Store};
use crate::validation;
use async_trait::async_trait;
use chrono::Utc;
use kube::ResourceExt;
use kubermatic_common::api::{Node, NodeDeployment};
use kubermatic_common::{Error, Result};
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub const CLUSTER_NOT_READY: &str = "Cluster components are not ready yet";

#[async_trait]
pub trait NodeProvider: Send + Sync {
    async fn list_nodes(&self, cluster: &Cluster) -> Result<Vec<Node>>;
    async fn get_node(&self, cluster: &Cluster, id: &str) -> Result<Option<Node>>;
    async fn create_node(&self, cluster: &Cluster, node: Node) -> Result<Node>;
    async fn delete_node(&self, cluster: &Cluster, id: &str) -> Result<()>;

    async fn list_node_deployments(&self, cluster: &Cluster) -> Result<Vec<NodeDeployment>>;
    async fn get_node_deployment(&self, cluster: &Cluster, id: &str) -> Result<Option<NodeDeployment>>;
    async fn create_node_deployment(
        &self,
        cluster: &Cluster,
        deployment: NodeDeployment,
    ) -> Result<NodeDeployment>;
    async fn update_node_deployment(
        &self,
        cluster: &Cluster,
        deployment: NodeDeployment,
    ) -> Result<NodeDeployment>;
    async fn delete_node_deployment(&self, cluster: &Cluster, id: &str) -> Result<()>;
}

/// Name for a machine or machine deployment created without one
fn generate_name(cluster_id: &str) -> String {
    const CHARSET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..5)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("kubermatic-{}-{}", cluster_id, suffix)
}

#[derive(Default)]
struct ClusterMachines {
    nodes: Vec<Node>,
    deployments: Vec<NodeDeployment>,
}

/// Machine layer kept in memory, keyed by cluster
#[derive(Default)]
pub struct MemoryNodeProvider {
    clusters: RwLock<HashMap<String, ClusterMachines>>,
    actions: RwLock<Vec<StoreAction>>,
}

impl MemoryNodeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutating calls made so far, oldest first
    pub async fn actions(&self) -> Vec<StoreAction> {
        self.actions.read().await.clone()
    }

    /// Seed a node without going through the API
    pub async fn insert_node(&self, cluster_id: &str, node: Node) {
        let mut clusters = self.clusters.write().await;
        clusters.entry(cluster_id.to_string()).or_default().nodes.push(node);
    }

    /// Seed a node deployment without going through the API
    pub async fn insert_node_deployment(&self, cluster_id: &str, deployment: NodeDeployment) {
        let mut clusters = self.clusters.write().await;
        clusters
            .entry(cluster_id.to_string())
            .or_default()
            .deployments
            .push(deployment);
    }

    async fn record(&self, verb: &'static str, resource: &'static str, name: &str) {
        self.actions.write().await.push(StoreAction {
            verb,
            resource,
            name: name.to_string(),
        });
    }
}

fn machine_not_found(id: &str) -> Error {
    Error::not_found("machines.cluster.k8s.io", id)
}

fn machine_deployment_not_found(id: &str) -> Error {
    Error::not_found("machinedeployments.cluster.k8s.io", id)
}

#[async_trait]
impl NodeProvider for MemoryNodeProvider {
    async fn list_nodes(&self, cluster: &Cluster) -> Result<Vec<Node>> {
        let clusters = self.clusters.read().await;
        Ok(clusters
            .get(&cluster.name_any())
            .map(|m| m.nodes.clone())
            .unwrap_or_default())
    }

    async fn get_node(&self, cluster: &Cluster, id: &str) -> Result<Option<Node>> {
        let clusters = self.clusters.read().await;
        Ok(clusters
            .get(&cluster.name_any())
            .and_then(|m| m.nodes.iter().find(|n| n.id == id).cloned()))
    }

    async fn create_node(&self, cluster: &Cluster, mut node: Node) -> Result<Node> {
        let cluster_id = cluster.name_any();
        if node.name.is_empty() {
            node.name = generate_name(&cluster_id);
        }
        node.id = node.name.clone();
        node.status.machine_name = node.name.clone();
        node.creation_timestamp = Utc::now();

        {
            let mut clusters = self.clusters.write().await;
            let machines = clusters.entry(cluster_id).or_default();
            if machines.nodes.iter().any(|n| n.id == node.id) {
                return Err(Error::AlreadyExists {
                    kind: "machines.cluster.k8s.io".to_string(),
                    name: node.id,
                });
            }
            machines.nodes.push(node.clone());
        }
        self.record("create", "machines", &node.id).await;
        Ok(node)
    }

    async fn delete_node(&self, cluster: &Cluster, id: &str) -> Result<()> {
        {
            let mut clusters = self.clusters.write().await;
            let machines = clusters
                .get_mut(&cluster.name_any())
                .ok_or_else(|| machine_not_found(id))?;
            let before = machines.nodes.len();
            machines.nodes.retain(|n| n.id != id);
            if machines.nodes.len() == before {
                return Err(machine_not_found(id));
            }
        }
        self.record("delete", "machines", id).await;
        Ok(())
    }

    async fn list_node_deployments(&self, cluster: &Cluster) -> Result<Vec<NodeDeployment>> {
        let clusters = self.clusters.read().await;
        Ok(clusters
            .get(&cluster.name_any())
            .map(|m| m.deployments.clone())
            .unwrap_or_default())
    }

    async fn get_node_deployment(&self, cluster: &Cluster, id: &str) -> Result<Option<NodeDeployment>> {
        let clusters = self.clusters.read().await;
        Ok(clusters
            .get(&cluster.name_any())
            .and_then(|m| m.deployments.iter().find(|d| d.id == id).cloned()))
    }

    async fn create_node_deployment(
        &self,
        cluster: &Cluster,
        mut deployment: NodeDeployment,
    ) -> Result<NodeDeployment> {
        let cluster_id = cluster.name_any();
        if deployment.name.is_empty() {
            deployment.name = generate_name(&cluster_id);
        }
        deployment.id = deployment.name.clone();
        deployment.creation_timestamp = Utc::now();

        {
            let mut clusters = self.clusters.write().await;
            let machines = clusters.entry(cluster_id).or_default();
            if machines.deployments.iter().any(|d| d.id == deployment.id) {
                return Err(Error::AlreadyExists {
                    kind: "machinedeployments.cluster.k8s.io".to_string(),
                    name: deployment.id,
                });
            }
            machines.deployments.push(deployment.clone());
        }
        self.record("create", "machinedeployments", &deployment.id).await;
        Ok(deployment)
    }

    async fn update_node_deployment(
        &self,
        cluster: &Cluster,
        deployment: NodeDeployment,
    ) -> Result<NodeDeployment> {
        {
            let mut clusters = self.clusters.write().await;
            let stored = clusters
                .get_mut(&cluster.name_any())
                .and_then(|m| m.deployments.iter_mut().find(|d| d.id == deployment.id))
                .ok_or_else(|| machine_deployment_not_found(&deployment.id))?;
            *stored = deployment.clone();
        }
        self.record("update", "machinedeployments", &deployment.id).await;
        Ok(deployment)
    }

    async fn delete_node_deployment(&self, cluster: &Cluster, id: &str) -> Result<()> {
        {
            let mut clusters = self.clusters.write().await;
            let machines = clusters
                .get_mut(&cluster.name_any())
                .ok_or_else(|| machine_deployment_not_found(id))?;
            let before = machines.deployments.len();
            machines.deployments.retain(|d| d.id != id);
            if machines.deployments.len() == before {
                return Err(machine_deployment_not_found(id));
            }
        }
        self.record("delete", "machinedeployments", id).await;
        Ok(())
    }
}

/// RFC 7386 JSON merge patch
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Identifies a cluster addressed through the project API
#[derive(Debug, Clone, Copy)]
pub struct ClusterRef<'a> {
    pub project_id: &'a str,
    pub datacenter: &'a str,
    pub cluster_id: &'a str,
}

#[derive(Clone)]
pub struct NodeService {
    store: Arc<dyn Store>,
    gate: AuthorizationGate,
    provider: Arc<dyn NodeProvider>,
}

impl NodeService {
    pub fn new(store: Arc<dyn Store>, gate: AuthorizationGate, provider: Arc<dyn NodeProvider>) -> Self {
        Self {
            store,
            gate,
            provider,
        }
    }

    /// Authorize the caller and load the cluster. Mutations that start
    /// machines additionally require every control plane component to be up.
    async fn cluster(
        &self,
        caller_email: &str,
        target: ClusterRef<'_>,
        operation: Operation,
        require_healthy: bool,
    ) -> Result<Cluster> {
        self.gate
            .authorize(caller_email, target.project_id, operation)
            .await?;

        let not_found = || Error::not_found(&ResourceKind::Cluster.qualified(), target.cluster_id);
        let cluster = self
            .store
            .get_cluster(target.cluster_id)
            .await?
            .ok_or_else(not_found)?;
        if cluster.project_id() != Some(target.project_id) {
            return Err(not_found());
        }
        if !cluster.spec.datacenter.is_empty() && cluster.spec.datacenter != target.datacenter {
            return Err(not_found());
        }

        if require_healthy && !cluster.is_healthy() {
            return Err(Error::Unavailable(CLUSTER_NOT_READY.to_string()));
        }
        Ok(cluster)
    }

    pub async fn list_nodes(&self, caller_email: &str, target: ClusterRef<'_>) -> Result<Vec<Node>> {
        let cluster = self.cluster(caller_email, target, Operation::ListNodes, false).await?;
        self.provider.list_nodes(&cluster).await
    }

    pub async fn get_node(&self, caller_email: &str, target: ClusterRef<'_>, id: &str) -> Result<Node> {
        let cluster = self.cluster(caller_email, target, Operation::GetNode, false).await?;
        self.provider
            .get_node(&cluster, id)
            .await?
            .ok_or_else(|| machine_not_found(id))
    }

    pub async fn create_node(&self, caller_email: &str, target: ClusterRef<'_>, node: Node) -> Result<Node> {
        let cluster = self.cluster(caller_email, target, Operation::CreateNode, true).await?;
        if !node.name.is_empty() {
            validation::validate_resource_id(&node.name)?;
        }
        let created = self.provider.create_node(&cluster, node).await?;
        info!(project_id = %target.project_id, cluster = %target.cluster_id, node = %created.id, "created node");
        Ok(created)
    }

    pub async fn delete_node(&self, caller_email: &str, target: ClusterRef<'_>, id: &str) -> Result<()> {
        let cluster = self.cluster(caller_email, target, Operation::DeleteNode, false).await?;
        self.provider.delete_node(&cluster, id).await?;
        info!(project_id = %target.project_id, cluster = %target.cluster_id, node = %id, "deleted node");
        Ok(())
    }

    pub async fn list_node_deployments(
        &self,
        caller_email: &str,
        target: ClusterRef<'_>,
    ) -> Result<Vec<NodeDeployment>> {
        let cluster = self
            .cluster(caller_email, target, Operation::ListNodeDeployments, false)
            .await?;
        self.provider.list_node_deployments(&cluster).await
    }

    pub async fn get_node_deployment(
        &self,
        caller_email: &str,
        target: ClusterRef<'_>,
        id: &str,
    ) -> Result<NodeDeployment> {
        let cluster = self
            .cluster(caller_email, target, Operation::GetNodeDeployment, false)
            .await?;
        self.provider
            .get_node_deployment(&cluster, id)
            .await?
            .ok_or_else(|| machine_deployment_not_found(id))
    }

    pub async fn create_node_deployment(
        &self,
        caller_email: &str,
        target: ClusterRef<'_>,
        deployment: NodeDeployment,
    ) -> Result<NodeDeployment> {
        let cluster = self
            .cluster(caller_email, target, Operation::CreateNodeDeployment, true)
            .await?;
        if !deployment.name.is_empty() {
            validation::validate_resource_id(&deployment.name)?;
        }
        if deployment.spec.replicas < 0 {
            return Err(Error::InvalidInput("replicas must not be negative".to_string()));
        }
        let created = self.provider.create_node_deployment(&cluster, deployment).await?;
        info!(
            project_id = %target.project_id,
            cluster = %target.cluster_id,
            node_deployment = %created.id,
            "created node deployment"
        );
        Ok(created)
    }

    /// Apply a JSON merge patch to the deployment. Identity fields are
    /// never changed by the patch.
    pub async fn patch_node_deployment(
        &self,
        caller_email: &str,
        target: ClusterRef<'_>,
        id: &str,
        patch: &Value,
    ) -> Result<NodeDeployment> {
        let cluster = self
            .cluster(caller_email, target, Operation::PatchNodeDeployment, true)
            .await?;
        let current = self
            .provider
            .get_node_deployment(&cluster, id)
            .await?
            .ok_or_else(|| machine_deployment_not_found(id))?;

        let mut merged = serde_json::to_value(&current)
            .map_err(|e| Error::Internal(format!("failed to encode node deployment: {}", e)))?;
        merge_patch(&mut merged, patch);
        let mut patched: NodeDeployment = serde_json::from_value(merged)
            .map_err(|e| Error::BadRequest(format!("cannot decode patched node deployment: {}", e)))?;

        if patched.spec.replicas < 0 {
            return Err(Error::InvalidInput("replicas must not be negative".to_string()));
        }
        patched.id = current.id;
        patched.name = current.name;
        patched.creation_timestamp = current.creation_timestamp;
        patched.status = current.status;

        let updated = self.provider.update_node_deployment(&cluster, patched).await?;
        info!(
            project_id = %target.project_id,
            cluster = %target.cluster_id,
            node_deployment = %id,
            "patched node deployment"
        );
        Ok(updated)
    }

    pub async fn delete_node_deployment(
        &self,
        caller_email: &str,
        target: ClusterRef<'_>,
        id: &str,
    ) -> Result<()> {
        let cluster = self
            .cluster(caller_email, target, Operation::DeleteNodeDeployment, false)
            .await?;
        self.provider.delete_node_deployment(&cluster, id).await?;
        info!(
            project_id = %target.project_id,
            cluster = %target.cluster_id,
            node_deployment = %id,
            "deleted node deployment"
        );
        Ok(())
    }
}
