use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use discussion_service::config::StoreBackend;
use discussion_service::handlers;
use discussion_service::middleware::JwtVerifier;
use discussion_service::{AppState, Config};
use doc_store::{MemoryStore, PgDocumentStore, SharedStore};
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Discussion Service
///
/// Posts, comments and votes over a transactional document store, served
/// as a JSON API with live listings over server-sent events.
#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.app.json_logs);

    info!(
        env = %config.app.env,
        port = config.app.http_port,
        "Starting discussion-service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let store: SharedStore = match config.store.backend {
        StoreBackend::Memory => {
            if config.is_production() {
                tracing::warn!("In-memory document store in production; data is lost on restart");
            }
            MemoryStore::shared(config.store.watch_channel_capacity)
        }
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("DATABASE_URL not set")?;
            let store = PgDocumentStore::connect(
                url,
                config.store.max_connections,
                config.store.watch_channel_capacity,
            )
            .await
            .context("Failed to connect to PostgreSQL document store")?;
            Arc::new(store)
        }
    };
    info!(backend = store.backend_name(), "Document store ready");

    let verifier = Arc::new(
        JwtVerifier::new(&config.auth.jwt_secret).context("Failed to initialize JWT verifier")?,
    );
    let state = web::Data::new(AppState::new(store, config.transactions.retry_policy()));

    let bind_address = format!("{}:{}", config.app.host, config.app.http_port);
    info!("HTTP server listening on {}", bind_address);

    let server = HttpServer::new(move || {
        let verifier = verifier.clone();
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .configure(|cfg| handlers::configure(cfg, verifier))
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run();

    let handle = server.handle();
    actix_web::rt::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping HTTP server");
        handle.stop(true).await;
    });

    server.await.context("HTTP server error")?;

    info!("discussion-service stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
