//! Seedsync - Main entry point
//!
//! Serves a directory to peers and, when running as a node, keeps it in
//! sync with one or more seeds.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use seedsync::{
    api, config::Config, daemon::shutdown::ShutdownCoordinator, protocol, sync::Fetcher, sync::UpdateLoop, utils,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory to serve and, as a node, to keep in sync (overrides config)
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Run as a node pulling from seeds
    #[arg(long)]
    node: bool,

    /// Seed server address; may be repeated, in failover order
    #[arg(long = "seed", value_name = "ADDR")]
    seeds: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Replicate even when a seed runs a different version
    #[arg(long)]
    ignore_version_mismatch: bool,

    /// Print the fingerprint of a PEM certificate for `authorized_clients` and exit
    #[arg(long, value_name = "CERT")]
    fingerprint: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(root) = &args.root {
        config.root_dir = root.clone();
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if args.node {
        config.run_as_node = true;
    }
    if !args.seeds.is_empty() {
        config.node.seed_servers = args.seeds.clone();
    }
    if args.ignore_version_mismatch {
        config.node.ignore_version_mismatch = true;
    }
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }

    config.normalize();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(cert) = &args.fingerprint {
        println!("{}", api::tls::fingerprint_file(cert)?);
        return Ok(());
    }

    let config = Arc::new(load_config(&args)?);

    // Initialize logging
    utils::logger::init(&config.log.level)?;

    tracing::info!(
        "Starting seedsync v{} (node_id: {}, root: {})",
        protocol::VERSION,
        config.node_id,
        config.root_dir.display()
    );

    if config.authorized_clients.is_empty() {
        tracing::warn!("No authorized_clients configured, the API is open to every caller");
    }

    let shutdown = ShutdownCoordinator::new();
    let mut app_state = api::AppState::new(&config, protocol::VERSION);

    // Spawn the update loop when running as a node
    let update_handle = if config.run_as_node {
        let fetcher = Arc::new(Fetcher::new(&config, protocol::VERSION)?);
        let update_loop = UpdateLoop::new(Arc::clone(&config), fetcher, protocol::VERSION, shutdown.token())?;
        app_state = app_state.with_node_status(update_loop.subscribe());
        tracing::info!("Seeds: {}", config.node.seed_servers.join(", "));
        Some(tokio::spawn(update_loop.run()))
    } else {
        None
    };

    let app = api::create_router(app_state);

    let ip = config
        .api
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", config.api.bind_address))?;
    let addr = SocketAddr::new(ip, config.api.port);

    let server_handle = if config.tls.enabled {
        let tls = api::tls::server_config(&config.tls)?;
        let acceptor = api::tls::PeerAcceptor::new(axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(tls)));

        let handle = axum_server::Handle::new();
        let token = shutdown.token();
        let graceful = handle.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            graceful.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        tracing::info!("Listening on https://{}", addr);
        let server = axum_server::bind(addr)
            .acceptor(acceptor)
            .handle(handle)
            .serve(app.into_make_service());
        tokio::spawn(server)
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind {}", addr))?;

        tracing::info!("Listening on http://{}", addr);
        let token = shutdown.token();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move { token.cancelled().await });
        tokio::spawn(async move { server.await })
    };

    // Wait for a shutdown signal, or for the server to die on its own
    let mut server_handle = server_handle;
    let early_exit = shutdown.wait_for_signal_or(&mut server_handle).await;

    if let Some(handle) = update_handle {
        if let Some(Err(e)) = shutdown.drain("Update loop", handle, Duration::from_secs(10)).await {
            tracing::error!("Update loop task panicked: {}", e);
        }
    }

    if let Some(result) = early_exit {
        return Err(match result {
            Ok(Ok(())) => anyhow!("server stopped unexpectedly"),
            Ok(Err(e)) => anyhow::Error::new(e).context("server failed"),
            Err(e) => anyhow::Error::new(e).context("server task panicked"),
        });
    }

    match shutdown.drain("Server", server_handle, Duration::from_secs(5)).await {
        Some(Ok(Ok(()))) => tracing::info!("Server shutdown complete"),
        Some(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
        Some(Err(e)) => tracing::error!("Server task panicked: {}", e),
        None => {}
    }

    Ok(())
}
