// # tmhookd - Traffic Manager webhook daemon
//
// Thin integration layer between external-dns and tmhook-core:
// 1. Reading configuration from environment variables (see `config`)
// 2. Initializing logging and the runtime
// 3. Registering the Azure client and DNSEndpoint publisher
// 4. Serving the webhook and health endpoints until SIGTERM/SIGINT
//
// No reconciliation logic lives here; every record operation is a call
// into `TrafficManagerEngine`.
//
// ## Example
//
// ```bash
// export AZURE_SUBSCRIPTION_ID=00000000-0000-0000-0000-000000000000
// export AZURE_TENANT_ID=... AZURE_CLIENT_ID=... AZURE_CLIENT_SECRET=...
// export RESOURCE_GROUPS=rg-dns
// export DOMAIN_FILTER=example.com
//
// tmhookd
// ```

mod config;
mod server;

use anyhow::{Context, Result};
use config::Config;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tmhook_core::{EngineEvent, ProviderRegistry, StateMirror, TrafficManagerEngine};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// In-flight requests get this long to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum TmhookExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<TmhookExitCode> for ExitCode {
    fn from(code: TmhookExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Everything built before the servers start
struct Daemon {
    engine: Arc<TrafficManagerEngine>,
    events: mpsc::Receiver<EngineEvent>,
    webhook_listener: TcpListener,
    health_listener: TcpListener,
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return TmhookExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return TmhookExitCode::ConfigError.into();
    }

    let log_level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("{}", e);
            return TmhookExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TmhookExitCode::ConfigError.into();
    }

    info!("Starting tmhookd daemon");
    info!(
        resource_groups = ?config.resource_groups,
        domain_filter = ?config.domain_filter.include,
        cname_publication = config.dnsendpoint_enabled,
        "Configuration loaded"
    );
    if config.resource_groups.is_empty() {
        warn!("RESOURCE_GROUPS is empty; GET /records will only report profiles created by this process");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TmhookExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match start(&config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return TmhookExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(&config, daemon).await {
            error!("Daemon error: {:#}", e);
            TmhookExitCode::RuntimeError
        } else {
            TmhookExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Build the engine and bind both listeners
async fn start(config: &Config) -> Result<Daemon> {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "azure")]
    {
        info!("Registering Azure Traffic Manager client");
        tmhook_provider_azure::register(&registry);
    }

    #[cfg(feature = "dnsendpoint")]
    {
        info!("Registering DNSEndpoint publisher");
        tmhook_dnsendpoint::register(&registry);
    }

    let webhook_config = config.webhook_config();
    let client = registry
        .create_client(&webhook_config.client)
        .context("Failed to create Traffic Manager client")?;
    let publisher = registry
        .create_publisher(&webhook_config.publisher)
        .context("Failed to create CNAME publisher")?;

    info!(
        client = client.provider_name(),
        publisher = webhook_config.publisher.type_name(),
        "Components created"
    );

    let mirror = StateMirror::new(Duration::from_secs(webhook_config.engine.cache_ttl_secs));
    let (engine, events) = TrafficManagerEngine::new(client, publisher, mirror, webhook_config)?;

    let webhook_addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));

    let webhook_listener = TcpListener::bind(webhook_addr)
        .await
        .with_context(|| format!("Failed to bind webhook server on {}", webhook_addr))?;
    let health_listener = TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("Failed to bind health server on {}", health_addr))?;

    Ok(Daemon {
        engine: Arc::new(engine),
        events,
        webhook_listener,
        health_listener,
    })
}

/// Serve until a shutdown signal, then drain in-flight requests
async fn run_daemon(config: &Config, daemon: Daemon) -> Result<()> {
    let state = server::AppState::new(daemon.engine, config.request_timeout());

    tokio::spawn(log_events(daemon.events));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let webhook = tokio::spawn(serve(
        "webhook",
        daemon.webhook_listener,
        server::webhook_router(state.clone()),
        shutdown_rx.clone(),
    ));
    let health = tokio::spawn(serve(
        "health",
        daemon.health_listener,
        server::health_router(state.clone()),
        shutdown_rx,
    ));

    state.set_ready(true);
    info!(
        webhook_port = config.webhook_port,
        health_port = config.health_port,
        "Daemon ready"
    );

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    state.set_ready(false);
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(SHUTDOWN_GRACE, async { tokio::try_join!(webhook, health) }).await {
        Ok(Ok((webhook, health))) => {
            webhook?;
            health?;
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("Server task panicked: {}", e)),
        Err(_) => Err(anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_GRACE)),
    }
}

/// Run one axum server until the shared shutdown flag flips
async fn serve(
    name: &'static str,
    listener: TcpListener,
    app: axum::Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("{} server listening on {}", name, addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stopping| *stopping).await;
        })
        .await
        .with_context(|| format!("{} server failed", name))
}

/// Drain engine events into the log
async fn log_events(events: mpsc::Receiver<EngineEvent>) {
    let mut stream = ReceiverStream::new(events);
    while let Some(event) = stream.next().await {
        match event {
            EngineEvent::ConfigRejected { dns_name, reason } => {
                warn!(dns_name = %dns_name, "Rejected Traffic Manager configuration: {}", reason);
            }
            EngineEvent::PublishFailed { hostname, error } => {
                warn!(hostname = %hostname, "Vanity CNAME publication failed: {}", error);
            }
            EngineEvent::BatchFailed { error } => {
                error!("Change batch aborted: {}", error);
            }
            other => info!(event = ?other, "Engine event"),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
