//! API server entry point.

use std::error::Error;

use api::config::{Config, LogFormat};
use catalog::ProductCatalog;
use ledger::{EntitlementStore, InMemoryLedger, PostgresLedger, UserId, UserStore};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Configuration and tracing
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Product catalog
    let catalog = match &config.catalog_path {
        Some(path) => ProductCatalog::from_path(path)?,
        None => ProductCatalog::builtin(),
    };
    tracing::info!(products = catalog.len(), "catalog loaded");

    // 4. Ledger backend
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
            let store = PostgresLedger::new(pool);
            store.run_migrations().await?;
            tracing::info!("using Postgres ledger");
            serve(config, store, catalog, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, entitlements will not survive a restart");
            serve(config, InMemoryLedger::new(), catalog, metrics_handle).await
        }
    }
}

async fn serve<S>(
    config: Config,
    store: S,
    catalog: ProductCatalog,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError>
where
    S: EntitlementStore + UserStore + Clone + 'static,
{
    // No vendor server client ships with this binary; vendor verification
    // stays disabled until one is wired in here.
    let state = api::create_default_state(store, catalog, &config, None);

    // Repair any premium flags left stale by a crash between grant and projection
    let summary = state.reconciler.projector().rebuild_all().await?;
    tracing::info!(
        users = summary.users,
        changed = summary.changed,
        "premium status rebuilt"
    );

    if let Some(token) = &config.dev_session_token {
        let user_id = UserId::new();
        state.sessions.insert(token.clone(), user_id).await;
        tracing::info!(%user_id, "registered development session");
    }

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
