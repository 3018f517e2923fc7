//! Kubermatic API server

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::config::KubeConfigOptions;
use kubermatic_api::config::{KubermaticConfig, StoreBackend};
use kubermatic_api::crd;
use kubermatic_api::middleware::auth::JwtAuth;
use kubermatic_api::nodes::{MemoryNodeProvider, NodeProvider};
use kubermatic_api::rbac::controller::{run_controllers, ControllerSettings};
use kubermatic_api::rbac::{ChainResolver, KubeApplier, MemoryApplier, MemoryDriver, Reconciler};
use kubermatic_api::routes::build_router;
use kubermatic_api::shutdown::{ShutdownCoordinator, TaskShutdown};
use kubermatic_api::store::{KubeStore, MemoryStore};
use kubermatic_api::{logging, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file, overrides KUBERMATIC_CONFIG and the standard locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server and the RBAC controllers (default)
    Serve,
    /// Print the CustomResourceDefinitions as YAML
    Crds,
    /// Print a sample configuration file
    SampleConfig,
    /// Mint a bearer token signed with the configured secret
    Token {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Validity in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<KubermaticConfig> {
    let config = match path {
        Some(path) => {
            let mut config = KubermaticConfig::load_from_file(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => KubermaticConfig::load()?,
    };
    Ok(config)
}

async fn kube_client(context: Option<&str>) -> anyhow::Result<kube::Client> {
    let config = match context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            kube::Config::from_kubeconfig(&options)
                .await
                .with_context(|| format!("failed to load kubeconfig context {}", context))?
        }
        None => kube::Config::infer()
            .await
            .context("failed to infer Kubernetes config")?,
    };
    Ok(kube::Client::try_from(config)?)
}

async fn serve(config: KubermaticConfig) -> anyhow::Result<()> {
    config.validate()?;

    let shutdown = ShutdownCoordinator::new();
    let mut tasks = TaskShutdown::new();
    let retry = config.rbac.retry_policy();
    let provider: Arc<dyn NodeProvider> = Arc::new(MemoryNodeProvider::new());
    let auth = JwtAuth::new(&config.auth.jwt_secret, config.auth.issuer.clone());

    let state = match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            let store = Arc::new(MemoryStore::new());
            let state = AppState::new(store.clone(), provider, retry, auth);
            if config.rbac.enabled {
                let reconciler = Reconciler::new(
                    store.clone(),
                    state.projects.clone(),
                    ChainResolver::offline(),
                    Arc::new(MemoryApplier::new()),
                );
                let driver = MemoryDriver::new(reconciler, store, config.rbac.requeue());
                tasks.register("rbac-driver", tokio::spawn(driver.run(shutdown.subscribe())));
            }
            state
        }
        StoreBackend::Kubernetes => {
            let client = kube_client(config.store.context.as_deref()).await?;
            info!("Using Kubernetes store");
            let store = Arc::new(KubeStore::new(client.clone()));
            let state = AppState::new(store.clone(), provider, retry, auth);
            if config.rbac.enabled {
                let reconciler = Reconciler::new(
                    store,
                    state.projects.clone(),
                    ChainResolver::for_cluster(client.clone()),
                    Arc::new(KubeApplier::new(client.clone())),
                );
                let settings = ControllerSettings {
                    credentials_namespace: config.rbac.credentials_namespace.clone(),
                    requeue: config.rbac.requeue(),
                };
                tasks.register(
                    "rbac-controllers",
                    tokio::spawn(run_controllers(client, reconciler, settings, shutdown.subscribe())),
                );
            }
            state
        }
    };

    let app = build_router(Arc::new(state));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Kubermatic API listening on {}", addr);

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.signal())
        .await?;

    info!("Server stopped, stopping background tasks");
    tasks.stop_all(shutdown.grace()).await;
    Ok(())
}

fn print_crds() -> anyhow::Result<()> {
    for (i, crd) in crd::all_crds().iter().enumerate() {
        if i > 0 {
            println!("---");
        }
        print!("{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = load_config(cli.config.as_ref())?;
            let _guard = logging::init(&config.logging)
                .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;
            serve(config).await
        }
        Commands::Crds => print_crds(),
        Commands::SampleConfig => {
            print!("{}", KubermaticConfig::generate_sample());
            Ok(())
        }
        Commands::Token { email, name, hours } => {
            let config = load_config(cli.config.as_ref())?;
            let auth = JwtAuth::new(&config.auth.jwt_secret, config.auth.issuer);
            println!("{}", auth.generate_token(&email, &name, chrono::Duration::hours(hours))?);
            Ok(())
        }
    }
}
