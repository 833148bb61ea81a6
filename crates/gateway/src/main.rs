use anyhow::Context;
use clap::Parser;
use gateway::config::StoreKind;
use gateway::{app, Forwarder, GatewayConfig, GatewayState};
use service_registry::{MemoryStore, Metadata, ServiceRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::parse();
    config.validate()?;

    let registry = match config.store {
        StoreKind::Etcd => {
            ServiceRegistry::connect(config.etcd_endpoints.clone(), Some(config.lease_ttl()))
                .await
                .context("Failed to connect to etcd")?
        }
        StoreKind::Memory => {
            warn!("Using in-memory registry store; registrations are lost on restart");
            let store = Arc::new(MemoryStore::new());
            let registry = ServiceRegistry::new(store.clone(), Some(config.lease_ttl()));
            store.spawn_sweeper(registry.lease_ttl());
            registry
        }
    };
    info!("Registrations lease for {:?}", registry.lease_ttl());

    for seed in &config.seeds {
        match registry
            .register(&seed.name, &seed.host, seed.port, Metadata::new())
            .await
        {
            Ok(_) => info!("Seeded {} at {}:{}", seed.name, seed.host, seed.port),
            Err(e) => error!("Failed to seed {} at {}:{}: {}", seed.name, seed.host, seed.port, e),
        }
    }

    let forwarder =
        Forwarder::new(config.attempt_timeout()).context("Failed to build HTTP client")?;
    let state = GatewayState::new(
        registry,
        forwarder,
        config.selection.build(),
        usize::from(config.attempts),
    )
    .with_max_body_bytes(config.max_body_bytes);

    let app = app(state, &config.services);

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    info!("Gateway listening on {}", listener.local_addr()?);
    info!("Proxying services: {}", config.services.join(", "));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway shutdown completed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
