//! Live call service binary.
//!
//! Startup:
//! 1. Initialize tracing from the observability config
//! 2. Load configuration
//! 3. Initialize Prometheus metrics recorder
//! 4. Connect to Redis
//! 5. Build signaling and sibling service clients
//! 6. Start the ring timeout scheduler
//! 7. Serve the HTTP API until SIGINT/SIGTERM

use common::secret::ExposeSecret;
use live_service::config::Config;
use live_service::observability::{init_metrics_recorder, HealthState};
use live_service::redis::RedisRoomStore;
use live_service::routes::{self, AppState};
use live_service::services::{
    CallSessionService, CallSessionSettings, Collaborators, GroupClient, MessageClient,
    PushClient, RelationClient, SignalingClient, UserClient, RING_TTL_GRACE,
};
use live_service::tasks::RingTimeoutScheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: log format and level come from it
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    let filter = config.observability.env_filter();
    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting live call service");
    info!(
        bind_address = %config.bind_address,
        ring_timeout_secs = config.ring_timeout.as_secs(),
        group_max_participants = config.group_max_participants,
        signaling_url = %config.signaling_url,
        "Configuration loaded successfully"
    );

    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    info!("Connecting to Redis...");
    let store = RedisRoomStore::new(
        config.redis_url.expose_secret(),
        config.ring_timeout + RING_TTL_GRACE,
        config.cache_op_timeout,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to connect to Redis");
        e
    })?;
    info!("Redis connection established");

    let signaling = SignalingClient::from_config(&config)?;

    let collaborators = Collaborators {
        store: Arc::new(store),
        signaling: Arc::new(signaling),
        push: Arc::new(PushClient::new(&config.push_service_url)?),
        relations: Arc::new(RelationClient::new(&config.relation_service_url)?),
        users: Arc::new(UserClient::new(&config.user_service_url)?),
        groups: Arc::new(GroupClient::new(&config.group_service_url)?),
        messages: Arc::new(MessageClient::new(&config.message_service_url)?),
    };

    let shutdown_token = CancellationToken::new();
    let timers = RingTimeoutScheduler::new(shutdown_token.child_token());

    let calls = CallSessionService::new(
        collaborators,
        timers.clone(),
        CallSessionSettings {
            ring_timeout: config.ring_timeout,
            group_max_participants: config.group_max_participants,
            signaling_public_url: config.signaling_public_url.clone(),
        },
    );

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, "Invalid bind address");
        e
    })?;

    let state = Arc::new(AppState { calls });
    let app = routes::build_routes(state, Arc::clone(&health_state), Some(prometheus_handle));

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
        e
    })?;

    health_state.set_ready();
    info!(addr = %addr, "Live call service listening");

    let server_health = Arc::clone(&health_state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stop receiving traffic before in-flight requests drain
            server_health.set_not_ready();
        })
        .await?;

    timers.shutdown().await;
    shutdown_token.cancel();

    info!("Live call service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
