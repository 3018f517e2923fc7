//! Shared state of the API server

use crate::authz::AuthorizationGate;
use crate::bindings::BindingStore;
use crate::health::HealthChecker;
use crate::identity::IdentityResolver;
use crate::middleware::auth::JwtAuth;
use crate::nodes::{NodeProvider, NodeService};
use crate::projects::ProjectManager;
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::users::MembershipService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub identity: IdentityResolver,
    pub gate: AuthorizationGate,
    pub projects: ProjectManager,
    pub memberships: MembershipService,
    pub nodes: NodeService,
    pub auth: Arc<JwtAuth>,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn NodeProvider>,
        retry: RetryPolicy,
        auth: JwtAuth,
    ) -> Self {
        let identity = IdentityResolver::new(store.clone());
        let bindings = BindingStore::new(store.clone(), retry);
        let gate = AuthorizationGate::new(bindings.clone());
        let projects = ProjectManager::new(store.clone(), bindings.clone(), retry);
        let memberships =
            MembershipService::new(identity.clone(), bindings, projects.clone(), gate.clone());
        let nodes = NodeService::new(store.clone(), gate.clone(), provider);

        Self {
            store,
            identity,
            gate,
            projects,
            memberships,
            nodes,
            auth: Arc::new(auth),
            health: Arc::new(HealthChecker::new(env!("CARGO_PKG_VERSION"))),
        }
    }
}
