mod api;
mod config;
mod enrich;
mod external;
mod jobs;
mod scan;
mod state;
#[cfg(test)]
mod test_support;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use api::api_router;
use config::{config_path_from_env, load_or_create_config, resolve_path};
use external::{MusicBrainz, ProviderFetcher};
use jobs::JobManager;
use library::Library;
use metadata::LoftyDecoder;
use parking_lot::RwLock;
use scan::WebDavConnector;
use state::AppState;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let index_path_value = config.index_path.trim();
    let index_path_value = if index_path_value.is_empty() {
        "library.redb"
    } else {
        index_path_value
    };
    let index_path = resolve_path(&config_path, index_path_value);
    if let Some(parent) = index_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let library = Library::open(&index_path)?;

    let enrichment = ProviderFetcher::new(
        Duration::from_secs(config.enrichment.timeout_secs.max(1)),
        resolve_path(&config_path, &config.enrichment.lyrics_dir),
        resolve_path(&config_path, &config.enrichment.covers_dir),
    )?;
    let catalog = MusicBrainz::new(
        &config.catalog.user_agent,
        Duration::from_secs(config.catalog.timeout_secs.max(1)),
    )?;

    if config.webdav.is_configured() {
        info!(
            "WebDAV share {} (root {})",
            config.webdav.url, config.webdav.root_path
        );
    } else {
        info!("WebDAV share not configured yet; PUT /api/webdav/config to set one.");
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        config_path,
        config: Arc::new(RwLock::new(config)),
        library,
        jobs: JobManager::new(),
        connector: Arc::new(WebDavConnector),
        decoder: Arc::new(LoftyDecoder),
        enrichment: Arc::new(enrichment),
        catalog: Arc::new(catalog),
    };

    let app = Router::new()
        .nest("/api", api_router(state.clone()))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if state.jobs.cancel() {
        info!("Waiting for the running job to stop...");
    }
    state.jobs.join().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
