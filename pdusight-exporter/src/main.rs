//! PDU Prometheus exporter.
//!
//! Polls the configured PDUs over their JSON-RPC management API and exposes
//! the discovered sensors on an HTTP metrics endpoint.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pdusight_client::{Auth, PduClient, RpcClient};
use pdusight_exporter::config::DiscoveryFailurePolicy;
use pdusight_exporter::{
    DeviceCollector, DevicePoller, ExporterConfig, HttpServer, Registry, init_tracing,
};

/// Prometheus exporter for PDU sensor readings.
#[derive(Parser, Debug)]
#[command(name = "pdusight-exporter")]
#[command(about = "Export PDU sensor readings as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: String,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ExporterConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    info!(
        devices = config.devices.len(),
        interval_secs = config.interval_secs,
        "Starting pdusight exporter"
    );

    let listen_addr = config
        .server
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One collector per configured device, owned by the registry for the
    // lifetime of the process.
    let mut registry = Registry::new(&config.namespace);
    let mut tasks = Vec::new();

    for device in &config.devices {
        let policy = config.device_labels(device);
        let rpc = RpcClient::new(
            Duration::from_secs(device.timeout_secs),
            Auth {
                username: device.username.clone(),
                password: device.password.clone(),
            },
        )
        .with_context(|| format!("Failed to build RPC client for {}", device.name))?;

        let base_url = device
            .url()
            .parse()
            .with_context(|| format!("Invalid address for {}: {}", device.name, device.address))?;

        let collector = Arc::new(DeviceCollector::new(&device.name, policy));
        registry.register(collector.clone());

        let poller = Arc::new(DevicePoller::new(
            &device.name,
            PduClient::new(rpc, base_url),
            collector,
            Duration::from_secs(config.interval_secs),
            policy.wants_snmp(),
        ));

        // First discovery runs synchronously so scrapes right after startup
        // already see the device.
        match poller.discover().await {
            Ok(catalog) => {
                info!(device = %device.name, sensors = catalog.len(), "Initial discovery complete");
                tasks.extend(poller.spawn_tasks(catalog, shutdown_rx.clone()));
            }
            Err(e) => match config.on_discovery_failure {
                DiscoveryFailurePolicy::Abort => {
                    return Err(e).with_context(|| {
                        format!("Initial discovery failed for {}", device.name)
                    });
                }
                DiscoveryFailurePolicy::Skip => {
                    warn!(device = %device.name, error = %e, "Initial discovery failed, device stays registered and will be retried");
                    tasks.extend(poller.spawn_tasks(Vec::new(), shutdown_rx.clone()));
                }
            },
        }
    }

    // Start HTTP server
    let http_server = HttpServer::new(
        Arc::new(registry),
        listen_addr,
        config.server.path.clone(),
    );
    let http_shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    }));

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).expect("failed to install SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown; in-flight device calls finish but are not
    // rescheduled.
    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;

    info!("Exporter stopped");
    Ok(())
}
