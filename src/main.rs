//! Envoy JWT auth helper - Main Entry Point
//!
//! Loads the configuration, connects to the SPIFFE Workload API and serves
//! the Envoy `Authorization` service until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::lookup_host;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use jwt_auth_helper::auth::AuthServer;
use jwt_auth_helper::config::{Config, DEFAULT_CONFIG_PATH};
use jwt_auth_helper::grpc::{server_builder, AuthorizationService};
use jwt_auth_helper::observability::{init_telemetry, shutdown_telemetry, CheckMetrics, TelemetryConfig};
use jwt_auth_helper::proto::envoy::service::auth::v3::authorization_server::AuthorizationServer;
use jwt_auth_helper::shutdown::{run_with_graceful_shutdown, wait_for_signal, ShutdownCoordinator};
use jwt_auth_helper::source::{WorkloadApiAddr, WorkloadApiSource};

/// Envoy external authorization helper for JWT-SVIDs
#[derive(Parser, Debug)]
#[command(name = "envoy-jwt-auth-helper", version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "JWT_AUTH_HELPER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    init_telemetry(&TelemetryConfig::from_config(&config)).context("failed to initialise logging")?;

    info!(mode = %config.mode, "Starting envoy-jwt-auth-helper");

    let metrics = Arc::new(CheckMetrics::new().context("failed to register metrics")?);

    let workload_addr: WorkloadApiAddr = config
        .socket_path
        .parse()
        .with_context(|| format!("invalid socket_path {:?}", config.socket_path))?;
    let (source, watcher) = WorkloadApiSource::connect(&workload_addr, config.fetch_timeout, config.startup_timeout)
        .await
        .with_context(|| format!("unable to create JWT source from {workload_addr}"))?;
    info!(addr = %workload_addr, bundles = source.bundles().len(), "Connected to the Workload API");

    let mut shutdown_coordinator = ShutdownCoordinator::new();
    shutdown_coordinator.spawn(
        "jwt-bundle-watcher",
        watcher.with_update_counter(metrics.bundle_updates.clone()).run(),
    );

    let auth_server = AuthServer::new(config.mode, config.audience.clone(), Arc::new(source))
        .with_call_timeout(config.fetch_timeout)
        .with_metrics(metrics.clone());
    let service = AuthorizationService::new(Arc::new(auth_server));

    let addr = lookup_host(config.listen_addr())
        .await
        .with_context(|| format!("unable to resolve listen address {}", config.listen_addr()))?
        .next()
        .with_context(|| format!("no address found for {}", config.listen_addr()))?;

    info!(%addr, "Starting gRPC server");

    let server = server_builder(&config)
        .layer(TraceLayer::new_for_grpc())
        .add_service(AuthorizationServer::new(service))
        .serve_with_shutdown(addr, wait_for_signal());

    run_with_graceful_shutdown(server, shutdown_coordinator, config.shutdown_timeout)
        .await
        .context("gRPC server failed")?;

    debug!(metrics = %metrics.render(), "Final metrics");
    shutdown_telemetry();

    info!("envoy-jwt-auth-helper stopped");

    Ok(())
}
