//! netdio-sim - netdio device simulator
//!
//! Plays the device role of the netdio protocol for conformance testing:
//! UDP discovery/admission plus the single-client TCP command channel,
//! with optional random fault injection.

use netdio_server::{Config, DiscoveryService, FaultInjector, Server};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if NETDIO_CONFIG is set, then env
    // overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("NETDIO_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("Invalid config: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting netdio simulator");
    tracing::info!("  Device name: {}", config.identity.name);
    tracing::info!("  Bind address: {}", config.network.socket_addr());
    match config.admission.connect_code {
        Some(code) => tracing::info!("  Admission: connect code required ({:#010x})", code),
        None => tracing::info!("  Admission: open"),
    }

    let fault = if config.fault.enabled {
        tracing::warn!(
            "  Fault injection: enabled (p={}, seed={:?})",
            config.fault.probability,
            config.fault.seed
        );
        Some(Arc::new(FaultInjector::new(
            config.fault.probability,
            config.fault.seed,
        )))
    } else {
        tracing::info!("  Fault injection: disabled");
        None
    };

    let mut discovery = DiscoveryService::bind(
        config.network.socket_addr(),
        config.identity.clone(),
        &config.admission,
        config.network.port,
    )
    .await?;
    if let Some(ref injector) = fault {
        discovery = discovery.with_fault(injector.clone());
    }

    let server = Server::new(&config, fault);

    tokio::select! {
        result = discovery.run() => {
            tracing::error!("Discovery service exited: {:?}", result.err());
        }
        result = server.run() => {
            tracing::error!("Command server exited: {:?}", result.err());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received ctrl-c, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
