//! Kubermatic API library
//!
//! Project membership, authorization and RBAC generation for the
//! kubermatic.k8c.io API, exposed for the server binary and for tests.

// Core
pub mod config;
pub mod crd;
pub mod error;
pub mod retry;
pub mod store;
pub mod validation;

// Identity and authorization
pub mod authz;
pub mod bindings;
pub mod identity;
pub mod policy;

// Services
pub mod nodes;
pub mod projects;
pub mod users;

// RBAC synthesis
pub mod rbac;

// HTTP
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod state;
pub use state::AppState;

// Runtime
pub mod logging;
pub mod shutdown;
