//! Termination handling for `serve`
//!
//! SIGINT or SIGTERM flips a watch channel observed by the HTTP server and
//! the RBAC drivers. Background tasks then get a grace period to finish.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const DEFAULT_GRACE: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            grace: DEFAULT_GRACE,
        }
    }

    /// Receiver that turns `true` once shutdown starts
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Start shutting down. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            info!("Shutting down");
        }
    }

    /// Block until SIGINT or SIGTERM, then trigger
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            _ = interrupt() => info!("Received SIGINT"),
            _ = terminate() => info!("Received SIGTERM"),
        }
        self.trigger();
    }

    /// Future for `axum::serve(..).with_graceful_shutdown`
    pub fn signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }

    /// Time each background task gets to stop
    pub fn grace(&self) -> Duration {
        self.grace
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Background tasks stopped after the server exits
#[derive(Default)]
pub struct TaskShutdown {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    /// Wait up to `grace` for each task, aborting stragglers
    pub async fn stop_all(&mut self, grace: Duration) {
        for (name, mut handle) in self.tasks.drain(..) {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => info!(task = name, "Task stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Task failed"),
                Err(_) => {
                    warn!(task = name, "Task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }
}
