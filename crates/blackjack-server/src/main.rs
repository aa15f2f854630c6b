//! Axum server for the 1-on-1 blackjack match lifecycle: a `/ws` upgrade endpoint backed by
//! the Session Hub, Frame Dispatcher, and the blackjack-core room/game/matchmaking services.

mod dispatcher;
mod gateway;
mod hub;
mod session;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

use blackjack_core::auth::JwtManager;
use blackjack_core::balance_client::{BalanceRatingClient, HttpBalanceRatingClient};
use blackjack_core::config::CoreConfig;
use blackjack_core::event_bus::{EventBus, NatsEventBus};
use blackjack_core::game_service::GameService;
use blackjack_core::matchmaking_service::MatchmakingService;
use blackjack_core::room_service::RoomService;
use blackjack_core::store::{InMemoryRoomStore, RoomStore};

use hub::Hub;

/// The collaborators every frame handler needs. Constructed once at startup and shared
/// behind `Arc` with every session task.
pub struct Services {
    pub rooms: Arc<RoomService>,
    pub games: Arc<GameService>,
    pub matchmaking: Arc<MatchmakingService>,
    pub auth: Arc<JwtManager>,
    pub ws_read_timeout: Duration,
    pub ws_write_timeout: Duration,
    pub ws_idle_timeout: Duration,
}

#[derive(Clone)]
pub struct AppState {
    hub: Arc<Hub>,
    services: Arc<Services>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CoreConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("configuration error: {e}");
        std::process::exit(1);
    });

    let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
    let balance: Arc<dyn BalanceRatingClient> = Arc::new(HttpBalanceRatingClient::new(config.balance_service_url.clone()));
    let event_bus: Arc<dyn EventBus> = Arc::new(
        NatsEventBus::connect(&config.nats_hosts, config.nats_game_result_subject.clone())
            .await
            .unwrap_or_else(|e| {
                tracing::error!("failed to connect to event bus: {e}");
                std::process::exit(1);
            }),
    );

    let rooms = Arc::new(RoomService::new(store.clone(), balance.clone()));
    let games = Arc::new(GameService::new(store.clone(), balance.clone(), event_bus.clone()));
    let matchmaking = Arc::new(MatchmakingService::new(
        store.clone(),
        balance.clone(),
        rooms.clone(),
        config.ranked_mmr_range,
    ));
    let auth = Arc::new(JwtManager::new(config.jwt_secret.clone()));

    let state = AppState {
        hub: Arc::new(Hub::new()),
        services: Arc::new(Services {
            rooms,
            games,
            matchmaking,
            auth,
            ws_read_timeout: config.ws_read_timeout,
            ws_write_timeout: config.ws_write_timeout,
            ws_idle_timeout: config.ws_idle_timeout,
        }),
    };

    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./dist".to_string());
    let static_files = ServeDir::new(&static_dir).not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    let app = Router::new()
        .route(&config.ws_path, get(gateway::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback_service(static_files);

    let port: u16 = std::env::var("WS_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8081);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("blackjack server listening on {addr}, ws path {}", config.ws_path);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    serve_with_bounded_shutdown(listener, app, config.server_shutdown_timeout).await;
}

/// Runs the server until a SIGINT/SIGTERM is received, then drains in-flight connections for
/// up to `shutdown_timeout` before giving up and exiting. Mirrors the reference implementation's
/// `context.WithTimeout` bound around `http.Server.Shutdown`.
async fn serve_with_bounded_shutdown(listener: tokio::net::TcpListener, app: Router, shutdown_timeout: Duration) {
    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    let notify_for_graceful = shutdown_notify.clone();

    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { notify_for_graceful.notified().await })
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining connections (up to {shutdown_timeout:?})");
    shutdown_notify.notify_one();

    match tokio::time::timeout(shutdown_timeout, server_task).await {
        Ok(Ok(Ok(()))) => tracing::info!("server shut down gracefully"),
        Ok(Ok(Err(e))) => tracing::error!("server error: {e}"),
        Ok(Err(e)) => tracing::error!("server task panicked: {e}"),
        Err(_) => tracing::warn!("graceful shutdown did not finish within {shutdown_timeout:?}, exiting anyway"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
