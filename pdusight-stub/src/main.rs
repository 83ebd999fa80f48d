//! Standalone fake PDU for local exporter development.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pdusight_stub::{StubConfig, StubState, router};

/// Fake PDU JSON-RPC server.
#[derive(Parser, Debug)]
#[command(name = "pdusight-stub")]
#[command(about = "Serves a fake PDU management API for testing")]
#[command(version)]
struct Args {
    /// Listening port.
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Username for basic auth.
    #[arg(short, long, default_value = "admin", env = "PDU_USERNAME")]
    username: String,

    /// Password for basic auth.
    #[arg(short, long, default_value = "pdupass", env = "PDU_PASSWORD")]
    password: String,

    /// Number of inlets.
    #[arg(long, default_value_t = 2, env = "PDU_INLETS")]
    inlets: u32,

    /// Number of outlets.
    #[arg(long, default_value_t = 8, env = "PDU_OUTLETS")]
    outlets: u32,

    /// Name the fake PDU reports.
    #[arg(long, default_value = "Fake Name", env = "PDU_NAME")]
    pdu_name: String,

    /// Serial number the fake PDU reports.
    #[arg(long, default_value = "FAKESERIALNUMBER", env = "PDU_SERIAL")]
    pdu_serial: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let stub = StubState::new(StubConfig {
        username: args.username,
        password: args.password,
        pdu_name: args.pdu_name,
        pdu_serial: args.pdu_serial,
        inlets: args.inlets,
        outlets: args.outlets,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!(addr = %listener.local_addr()?, "Stub PDU listening");

    axum::serve(listener, router(stub)).await?;
    Ok(())
}
