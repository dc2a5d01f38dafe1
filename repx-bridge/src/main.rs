use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use repx_bridge::transport::{self, AppState, SubscriberSettings};
use repx_bridge::{
    Bridge, Config, Ingress, IngressConfig, IngressPolicy, MockIngress, MotionSettings,
    ServerConfig, SubscriberRegistry, UdpIngress,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// How long shutdown waits for subscribers to receive their Close frame.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "repx-bridge")]
#[command(about = "Relay motion-sensor packets to WebSocket subscribers")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "repx-bridge.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tracing=info,repx_bridge=info,repx_core=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let policy = config.session.on_ingress_end;

    info!(
        addr = %config.server.addr,
        send_timeout_ms = config.server.send_timeout_ms,
        queue_capacity = config.server.queue_capacity,
        ?policy,
        "Starting repx-bridge"
    );

    match config.ingress {
        IngressConfig::Mock {
            sample_rate_hz,
            rest_min_s,
            rest_max_s,
            seed,
            profiles,
        } => {
            info!(
                sample_rate_hz,
                rest_min_s,
                rest_max_s,
                profile_count = profiles.len(),
                "Using motion generator ingress"
            );

            let settings = MotionSettings {
                sample_rate_hz,
                rest_min_s,
                rest_max_s,
                profiles,
            };
            let ingress = MockIngress::new(settings, seed)?;
            run_bridge(ingress, &config.server, policy).await?;
        }
        IngressConfig::Udp { addr } => {
            info!(%addr, "Using UDP notification ingress");
            run_bridge(UdpIngress::new(addr), &config.server, policy).await?;
        }
    }

    Ok(())
}

async fn run_bridge<I: Ingress>(
    ingress: I,
    server: &ServerConfig,
    policy: IngressPolicy,
) -> color_eyre::Result<()> {
    let cancel = CancellationToken::new();
    let bridge = Bridge::new(SubscriberRegistry::new());
    let connections = TaskTracker::new();

    let state = AppState {
        bridge: bridge.clone(),
        cancel: cancel.clone(),
        settings: SubscriberSettings {
            send_timeout: server.send_timeout(),
            queue_capacity: server.queue_capacity,
        },
        connections: connections.clone(),
    };

    let listener = TcpListener::bind(server.addr).await?;
    info!(addr = %server.addr, "WebSocket server listening");

    // Spawn ingress supervisor
    let bridge_for_ingress = bridge.clone();
    let cancel_for_ingress = cancel.clone();
    let ingress_handle = tokio::spawn(async move {
        let result = bridge_for_ingress
            .run_ingress(&ingress, policy, &cancel_for_ingress)
            .await;

        if let Err(e) = &result {
            error!(error = %e, "Ingress session over, shutting down");
            cancel_for_ingress.cancel();
        }

        result
    });

    let cancel_for_http = cancel.clone();

    tokio::select! {
        result = axum::serve(listener, transport::router(state)).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    cancel.cancel();

    if transport::drain_connections(&connections, SHUTDOWN_GRACE).await {
        info!("All subscriber connections closed");
    }

    let released = bridge.registry().clear();
    info!(released, "Subscribers released");

    let ingress_result = ingress_handle.await?;

    info!("repx-bridge shut down complete");
    ingress_result?;
    Ok(())
}
