//! `/healthz` and `/readyz`

use crate::state::AppState;
use crate::store::Store;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub store_latency_ms: u64,
}

pub struct HealthChecker {
    started: Instant,
    version: String,
}

impl HealthChecker {
    pub fn new(version: &str) -> Self {
        Self {
            started: Instant::now(),
            version: version.to_string(),
        }
    }

    pub fn liveness(&self) -> LivenessResponse {
        LivenessResponse {
            alive: true,
            version: self.version.clone(),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    /// Ready once the resource store answers a single-item ping
    pub async fn readiness(&self, store: &dyn Store) -> ReadinessResponse {
        let start = Instant::now();
        let reason = match store.ping().await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Store not reachable");
                Some(format!("store unreachable: {}", e))
            }
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
            store_latency_ms: start.elapsed().as_millis() as u64,
        }
    }
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<LivenessResponse> {
    Json(state.health.liveness())
}

pub async fn readyz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let readiness = state.health.readiness(state.store.as_ref()).await;
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}
