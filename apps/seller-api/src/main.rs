//! Vendra seller assistant API.
//!
//! Axum service exposing the inbound webhook endpoint and the marketplace
//! authorization flow, with the ingestion worker, expiry janitor, and
//! cache warm-up running as background tasks owned by this process.

mod config;
mod error;
mod logging;
mod routes;
mod state;
mod warmup;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use config::Config;
use state::AppState;
use warmup::CredentialWarmer;

use vendra_auth::{
    AuthFlowConfig, AuthFlowService, AuthJanitor, CredentialService, GlobalBackoff, TokenClient,
    TokenEndpointConfig,
};
use vendra_cache::{CacheWarmer, LayeredCache, PrefixHotKeys};
use vendra_db::{run_migrations, DbPool};
use vendra_gateway::{Gateway, GatewayConfig};
use vendra_ingest::{
    ClaimHandler, HandlerRegistry, HttpAnswerPipeline, IngestQueue, IngestWorker, QuestionHandler,
    WorkerConfig,
};
use vendra_marketplace::MarketplaceApi;
use vendra_vault::TokenVault;

/// Warm-up pass interval.
const WARMUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        env = %config.app_env,
        "Starting seller-api"
    );

    let db = match DbPool::connect_with(&config.database_url, config.database_max_connections).await
    {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = run_migrations(&db).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    let pool = db.inner().clone();

    let vault = match TokenVault::new(config.vault_key.clone()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let backoff = Arc::new(GlobalBackoff::new(pool.clone()));
    let token_client = match TokenClient::new(
        TokenEndpointConfig {
            token_url: config.marketplace_token_url.clone(),
            client_id: config.marketplace_client_id.clone(),
            client_secret: config.marketplace_client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        },
        backoff,
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let cache = LayeredCache::new(pool.clone(), Arc::new(PrefixHotKeys::default_hot_classes()));

    let flow = AuthFlowService::new(
        pool.clone(),
        vault.clone(),
        token_client.clone(),
        cache.clone(),
        AuthFlowConfig {
            authorization_url: config.marketplace_auth_url.clone(),
            client_id: config.marketplace_client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
        },
    );

    let credentials = Arc::new(CredentialService::new(pool.clone(), vault, token_client));
    let gateway = Gateway::new(pool.clone(), GatewayConfig::default(), credentials);

    let marketplace = match MarketplaceApi::new(
        gateway,
        cache.clone(),
        config.marketplace_api_url.clone(),
    ) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let pipeline = match HttpAnswerPipeline::new(config.pipeline_url.clone()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let registry = Arc::new(
        HandlerRegistry::new()
            .with_priority_handler(Arc::new(ClaimHandler::new()))
            .with_handler(Arc::new(QuestionHandler::new(
                marketplace,
                Arc::new(pipeline),
            ))),
    );

    let worker_handle =
        IngestWorker::new(pool.clone(), registry, WorkerConfig::default()).spawn();
    let janitor_handle = AuthJanitor::new(pool.clone()).spawn();
    let warmer_handle = CacheWarmer::new(cache.clone(), WARMUP_INTERVAL)
        .with_loader(Arc::new(CredentialWarmer::new(pool.clone())))
        .spawn();

    let app_state = AppState {
        pool: pool.clone(),
        flow,
        queue: IngestQueue::new(pool),
        cache,
        webhook_secret: config.webhook_secret.clone(),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    let router = Router::new()
        .route("/webhooks/marketplace", post(routes::webhooks::receive_webhook))
        .route("/auth/marketplace/begin", get(routes::auth::begin))
        .route("/auth/marketplace/callback", get(routes::auth::callback))
        .route("/health/live", get(routes::health::live))
        .route("/health/ready", get(routes::health::ready))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: invalid listen address: {e}");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "seller-api listening");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    info!("Shutting down background tasks");
    worker_handle.abort();
    janitor_handle.abort();
    warmer_handle.abort();
}

/// Resolve on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
