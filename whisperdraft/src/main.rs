use axum::http::{header, HeaderValue, Method};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use whisperdraft::api;
use whisperdraft::app_state::AppState;
use whisperdraft::completion::{CompletionClient, CompletionTransport, MockTransport, OpenAiTransport};
use whisperdraft::config::{self, ServerConfig};
use whisperdraft::storage::{SqliteKvStore, Storage};

/// Stand-in server key so the mock pipeline runs without real credentials.
const MOCK_SHARED_KEY: &str = "mock-server-key";

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("whisperdraft=info,tower_http=info")),
        )
        .init();

    // Load .env before reading configuration so keys in it are visible.
    config::load_env_file();
    let config = ServerConfig::from_env().map_err(std::io::Error::other)?;
    tracing::info!(?config, "Starting Whisperdraft API server");

    let backend = SqliteKvStore::open(&config.db_path)
        .map_err(std::io::Error::other)?
        .with_quota(config.storage_quota_bytes);
    let storage = Storage::new(Arc::new(backend));

    let (transport, shared_key): (Arc<dyn CompletionTransport>, Option<String>) = if config.mock_ai
    {
        tracing::warn!("Mock completions enabled; no provider calls will be made");
        let key = config
            .openai_api_key
            .clone()
            .or_else(|| Some(MOCK_SHARED_KEY.to_string()));
        (Arc::new(MockTransport::new()), key)
    } else {
        let transport = OpenAiTransport::new(config.openai_base_url.clone(), config.http_timeout)
            .map_err(std::io::Error::other)?;
        if config.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set; only callers with their own key get replies");
        }
        (Arc::new(transport), config.openai_api_key.clone())
    };
    let client = CompletionClient::new(transport, shared_key);

    let app_state = AppState::new(storage, client, config.settings.clone());
    if config.autosave {
        match app_state.ensure_autosave().await {
            Ok(_) => tracing::info!(
                interval_ms = app_state.settings().get().auto_save_interval_ms,
                "Autosave scheduler started"
            ),
            Err(e) => tracing::error!(error = %e, "Failed to start autosave scheduler"),
        }
    }

    // Configure CORS to allow known UI origins
    let allowed_origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    let api_state = api::ApiState {
        app_state: app_state.clone(),
    };

    let app = api::router()
        .with_state(api_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(bind = %config.bind, "Starting HTTP server");
    let listener = TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.stop_autosave().await;
    tracing::info!("Server stopped");
    Ok(())
}
