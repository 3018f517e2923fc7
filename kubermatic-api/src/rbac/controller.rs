//! RBAC reconciliation
//!
//! [`Reconciler`] holds the logic. It is driven either by kube-runtime
//! controllers watching the API server, or by [`MemoryDriver`] consuming
//! change events of the in-memory store.

use super::resources::gvk_of;
use super::{ChainResolver, RbacApplier, RbacError, RbacResult, RbacTarget};
use crate::crd::{Cluster, Project, UserProjectBinding, PROJECT_ID_LABEL};
use crate::projects::ProjectManager;
use crate::store::{MemoryStore, ResourceKind, Store, StoreEvent};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config;
use kube::{Api, Client, Resource, ResourceExt};
use kubermatic_common::ProjectPhase;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

pub const CONTROLLER_NAME: &str = "kubermatic-rbac-controller";

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    projects: ProjectManager,
    resolver: ChainResolver,
    applier: Arc<dyn RbacApplier>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        projects: ProjectManager,
        resolver: ChainResolver,
        applier: Arc<dyn RbacApplier>,
    ) -> Self {
        Self {
            store,
            projects,
            resolver,
            applier,
        }
    }

    /// Generate RBAC for the project itself and mark it `Active`
    pub async fn reconcile_project(&self, project: &Project) -> RbacResult<()> {
        let id = project.name_any();
        if project.meta().deletion_timestamp.is_some() || project.phase() == ProjectPhase::Terminating {
            debug!(project_id = %id, "project is being deleted, skipping");
            return Ok(());
        }

        let plural = self.resolver.plural_for(&gvk_of::<Project>()).await?;
        let target = RbacTarget::for_object(project, plural, &id);
        self.applier.apply(&target.desired()).await?;

        if project.phase() == ProjectPhase::Inactive {
            self.projects.activate(&id).await?;
        }
        debug!(project_id = %id, "reconciled project");
        Ok(())
    }

    /// Reconcile the project if it still exists
    pub async fn reconcile_project_by_id(&self, id: &str) -> RbacResult<()> {
        match self.store.get_project(id).await? {
            Some(project) => self.reconcile_project(&project).await,
            None => Ok(()),
        }
    }

    /// Generate RBAC for a resource labelled with its project
    pub async fn reconcile_resource<K>(&self, obj: &K) -> RbacResult<()>
    where
        K: Resource<DynamicType = ()>,
    {
        if obj.meta().deletion_timestamp.is_some() {
            return Ok(());
        }
        let project_id = obj
            .labels()
            .get(PROJECT_ID_LABEL)
            .cloned()
            .ok_or_else(|| RbacError::MissingProject {
                kind: K::kind(&()).into_owned(),
                name: obj.name_any(),
            })?;

        let plural = self.resolver.plural_for(&gvk_of::<K>()).await?;
        let target = RbacTarget::for_object(obj, plural, &project_id);
        self.applier.apply(&target.desired()).await?;
        debug!(kind = %K::kind(&()), name = %obj.name_any(), project_id = %project_id, "reconciled resource");
        Ok(())
    }

    /// Full pass over every project and project-owned cluster
    pub async fn reconcile_all(&self) -> RbacResult<()> {
        for project in self.store.list_projects().await? {
            self.reconcile_project(&project).await?;
        }
        for cluster in self.store.list_clusters().await? {
            if cluster.project_id().is_some() {
                self.reconcile_resource(&cluster).await?;
            }
        }
        Ok(())
    }
}

/// Settings of the kube-runtime controllers
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Namespace holding project credential secrets
    pub credentials_namespace: String,
    /// Delay before a failed object is reconciled again
    pub requeue: Duration,
}

struct Context {
    reconciler: Reconciler,
    recorder: Recorder,
    requeue: Duration,
}

impl Context {
    async fn publish_warning<K>(&self, obj: &K, error: &RbacError)
    where
        K: Resource<DynamicType = ()>,
    {
        let event = Event {
            type_: EventType::Warning,
            reason: "ReconcilingError".to_string(),
            note: Some(error.to_string()),
            action: "Reconciling".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &obj.object_ref(&())).await {
            warn!(name = %obj.name_any(), error = %e, "failed to publish event");
        }
    }
}

async fn reconcile_project(project: Arc<Project>, ctx: Arc<Context>) -> RbacResult<Action> {
    match ctx.reconciler.reconcile_project(&project).await {
        Ok(()) => Ok(Action::await_change()),
        Err(e) => {
            ctx.publish_warning(project.as_ref(), &e).await;
            Err(e)
        }
    }
}

async fn reconcile_labelled<K>(obj: Arc<K>, ctx: Arc<Context>) -> RbacResult<Action>
where
    K: Resource<DynamicType = ()>,
{
    match ctx.reconciler.reconcile_resource(obj.as_ref()).await {
        Ok(()) => Ok(Action::await_change()),
        Err(e) => {
            ctx.publish_warning(obj.as_ref(), &e).await;
            Err(e)
        }
    }
}

fn error_policy<K>(obj: Arc<K>, error: &RbacError, ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    error!(kind = %K::kind(&()), name = %obj.name_any(), error = %error, "reconcile failed");
    Action::requeue(ctx.requeue)
}

async fn log_results<K, E>(res: Result<(ObjectRef<K>, Action), E>)
where
    K: Resource<DynamicType = ()>,
    E: Debug,
{
    match res {
        Ok((obj, _)) => debug!(object = %obj, "reconciled"),
        Err(e) => debug!(error = ?e, "reconcile error"),
    }
}

/// Controller for a kind whose objects carry the project-id label
async fn run_labelled<K>(api: Api<K>, ctx: Arc<Context>)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    Controller::new(api, Config::default().labels(PROJECT_ID_LABEL))
        .run(reconcile_labelled::<K>, error_policy::<K>, ctx)
        .for_each(log_results)
        .await;
}

/// Run the Project, Cluster and Secret controllers until shutdown
pub async fn run_controllers(
    client: Client,
    reconciler: Reconciler,
    settings: ControllerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let reporter = Reporter {
        controller: CONTROLLER_NAME.to_string(),
        instance: std::env::var("POD_NAME").ok(),
    };
    let ctx = Arc::new(Context {
        reconciler,
        recorder: Recorder::new(client.clone(), reporter),
        requeue: settings.requeue,
    });

    let projects = Controller::new(Api::<Project>::all(client.clone()), Config::default())
        .watches(
            Api::<UserProjectBinding>::all(client.clone()),
            Config::default(),
            |binding| Some(ObjectRef::<Project>::new(&binding.spec.project_id)),
        )
        .run(reconcile_project, error_policy::<Project>, ctx.clone())
        .for_each(log_results);

    let clusters = run_labelled(Api::<Cluster>::all(client.clone()), ctx.clone());
    let secrets = run_labelled(
        Api::<Secret>::namespaced(client, &settings.credentials_namespace),
        ctx,
    );

    info!(namespace = %settings.credentials_namespace, "Starting RBAC controllers");
    tokio::select! {
        _ = futures::future::join3(projects, clusters, secrets) => {
            warn!("RBAC controllers stopped");
        }
        _ = shutdown.changed() => {
            info!("Stopping RBAC controllers");
        }
    }
}

/// A reconcile failure observed by [`MemoryDriver`]. Repeats of the same
/// failure are folded into one event, as the API server does for Events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningEvent {
    pub kind: ResourceKind,
    pub name: String,
    pub message: String,
    pub count: u32,
}

/// Reconciles on change events of a [`MemoryStore`]
#[derive(Clone)]
pub struct MemoryDriver {
    reconciler: Reconciler,
    store: Arc<MemoryStore>,
    requeue: Duration,
    warnings: Arc<RwLock<Vec<WarningEvent>>>,
}

impl MemoryDriver {
    pub fn new(reconciler: Reconciler, store: Arc<MemoryStore>, requeue: Duration) -> Self {
        Self {
            reconciler,
            store,
            requeue,
            warnings: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn warnings(&self) -> Vec<WarningEvent> {
        self.warnings.read().await.clone()
    }

    async fn record_warning(&self, kind: ResourceKind, name: &str, message: String) {
        let mut warnings = self.warnings.write().await;
        match warnings
            .iter_mut()
            .find(|w| w.kind == kind && w.name == name && w.message == message)
        {
            Some(existing) => existing.count = existing.count.saturating_add(1),
            None => warnings.push(WarningEvent {
                kind,
                name: name.to_string(),
                message,
                count: 1,
            }),
        }
    }

    /// Reconcile whatever `event` affects
    pub async fn handle(&self, event: &StoreEvent) -> RbacResult<()> {
        match event.kind {
            ResourceKind::Project | ResourceKind::UserProjectBinding => match &event.project_id {
                Some(project_id) => self.reconciler.reconcile_project_by_id(project_id).await,
                None => Ok(()),
            },
            ResourceKind::Cluster if !event.deleted => {
                match self.store.get_cluster(&event.name).await? {
                    Some(cluster) => self.reconciler.reconcile_resource(&cluster).await,
                    None => Ok(()),
                }
            }
            ResourceKind::Cluster | ResourceKind::User => Ok(()),
        }
    }

    /// Process events until shutdown. Failed events are retried after the
    /// requeue delay.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.store.subscribe();
        let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<StoreEvent>();

        if let Err(e) = self.reconciler.reconcile_all().await {
            warn!(error = %e, "initial reconcile failed");
        }

        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => break,
                received = events.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "missed store events, resyncing");
                        if let Err(e) = self.reconciler.reconcile_all().await {
                            warn!(error = %e, "resync failed");
                        }
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(event) = retry_rx.recv() => event,
            };

            if let Err(e) = self.handle(&event).await {
                warn!(kind = ?event.kind, name = %event.name, error = %e, "reconcile failed, requeueing");
                self.record_warning(event.kind, &event.name, e.to_string()).await;

                let retry_tx = retry_tx.clone();
                let delay = self.requeue;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = retry_tx.send(event);
                });
            }
        }
        info!("RBAC driver stopped");
    }
}
