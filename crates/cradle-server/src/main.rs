mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use cradle_api::admin::ServiceAccount;
use cradle_api::auth::{AppState, AppStateInner, PasswordIdentityProvider};
use cradle_core::children::ChildRegistry;
use cradle_core::logs::LogBook;
use cradle_db::Database;
use cradle_gateway::{GatewayContext, handle_connection};
use cradle_store::{DocumentStore, SqliteStore};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cradle=debug,tower_http=debug".into()),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let service_account = ServiceAccount::load(&config.service_account_path)?;
    if service_account.is_none() {
        warn!(
            "No service account at {}, admin routes disabled",
            config.service_account_path.display()
        );
    }

    // Init database and document store
    let db = Arc::new(Database::open(&config.db_path)?);
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(db.clone()));
    let logs = LogBook::new(store.clone(), &config.timestamp_policies);
    let children = ChildRegistry::new(store.clone());

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        identity: PasswordIdentityProvider::new(db),
        store,
        logs: logs.clone(),
        children: children.clone(),
        jwt_secret: config.jwt_secret.clone(),
        service_account,
    });

    let gateway = GatewayContext {
        logs,
        children,
        jwt_secret: config.jwt_secret.clone(),
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    let app = Router::new()
        .merge(cradle_api::routes(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Cradle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Cradle server stopped");
    Ok(())
}

async fn ws_upgrade(
    State(ctx): State<GatewayContext>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, ctx))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
