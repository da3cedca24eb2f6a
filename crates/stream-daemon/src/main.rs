mod core;
mod log_forward;
mod mpv;
mod player;
mod socket;

use std::path::PathBuf;

use anyhow::Context;
use stream_proto::config::Config;
use stream_proto::protocol::MetadataSnapshot;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,stream_daemon=debug,stream_audio=debug";

/// Fan-out from the core (and the log layer) to every connected client.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated,
    MetadataUpdated(MetadataSnapshot),
    Log(String),
    Error(String),
}

/// File log under the data dir plus WARN/ERROR forwarding to clients.
/// `RUST_LOG` overrides the default filter.
fn init_tracing(broadcast_tx: broadcast::Sender<BroadcastMessage>) -> anyhow::Result<PathBuf> {
    let data_dir = stream_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let log_path = data_dir.join("streamd.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(log_forward::ClientLogLayer::new(broadcast_tx))
        .with(filter)
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);
    let log_path = init_tracing(broadcast_tx.clone())?;
    info!("Logging to {}", log_path.display());

    let config = Config::load()?;
    info!("Config loaded from {}", Config::config_path().display());

    let (event_tx, event_rx) = mpsc::channel::<core::DaemonEvent>(256);
    let daemon_core = core::DaemonCore::new(config.clone(), broadcast_tx.clone()).await?;

    let addr = format!("{}:{}", config.control.bind_address, config.control.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding control socket {}", addr))?;
    info!("Control socket listening at {}", addr);
    let server = socket::ControlServer::new(
        daemon_core.state_manager(),
        event_tx.clone(),
        broadcast_tx.clone(),
    );
    tokio::spawn(server.serve(listener));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = event_tx.send(core::DaemonEvent::Shutdown).await;
        }
    });

    daemon_core.run(event_rx).await?;
    info!("Daemon stopped");
    Ok(())
}
