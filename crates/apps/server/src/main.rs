use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use compositor::{
    EngineConfig, FOREGROUND_MARKER_ID, HttpStyleProvider, InMemorySurface, OverlayEngine,
};
use credentials::{CredentialCache, CredentialCacheConfig, HttpCredentialService};
use foundation::time::SystemClock;
use runtime::NoticeBus;
use store::{JsonFileStore, KeyValueStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;

#[derive(Clone, Debug)]
struct ServerConfig {
    addr: SocketAddr,
    tile_service_url: String,
    credential_service_url: String,
    client_id: String,
    client_secret: String,
    state_path: PathBuf,
    fetch_timeout: Duration,
    animation_fps: f64,
}

impl ServerConfig {
    fn from_env() -> Self {
        let addr: SocketAddr = env::var("DASHBOARD_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:9200".to_string())
            .parse()
            .expect("invalid DASHBOARD_ADDR");
        let tile_service_url =
            env::var("TILE_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:9300".to_string());
        Self {
            addr,
            credential_service_url: env::var("CREDENTIAL_SERVICE_URL")
                .unwrap_or_else(|_| tile_service_url.clone()),
            tile_service_url,
            client_id: env::var("CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("CLIENT_SECRET").unwrap_or_default(),
            state_path: env::var("STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("dashboard-state.json")),
            fetch_timeout: Duration::from_millis(env_var_u64("FETCH_TIMEOUT_MS", 10_000)),
            animation_fps: env_var_f64("ANIMATION_FPS", 30.0).clamp(1.0, 120.0),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    if config.client_id.is_empty() || config.client_secret.is_empty() {
        warn!("CLIENT_ID/CLIENT_SECRET not set; licensed overlays will fail to activate");
    }

    let http = reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .build()
        .unwrap_or_else(|err| {
            warn!("falling back to default HTTP client: {err}");
            reqwest::Client::new()
        });

    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&config.state_path));
    let notices = Arc::new(NoticeBus::new());
    let credentials = CredentialCache::new(
        Arc::new(HttpCredentialService::new(
            http.clone(),
            &config.credential_service_url,
            &config.client_id,
            &config.client_secret,
        )),
        Arc::new(SystemClock),
        Some(store.clone()),
        CredentialCacheConfig {
            fetch_timeout: config.fetch_timeout,
            ..CredentialCacheConfig::default()
        },
    );

    let surface = Arc::new(InMemorySurface::with_base_primitives(&[
        "background",
        "coastline",
        FOREGROUND_MARKER_ID,
        "vessel-markers",
        "place-labels",
    ]));
    let engine = OverlayEngine::new(
        surface.clone(),
        Arc::new(HttpStyleProvider::new(http, &config.tile_service_url)),
        credentials,
        Some(store),
        notices,
        EngineConfig {
            fetch_timeout: config.fetch_timeout,
            frame_interval: Duration::from_secs_f64(1.0 / config.animation_fps),
            ..EngineConfig::default()
        },
    );

    let restoring = engine.clone();
    tokio::spawn(async move {
        let restored = restoring.restore().await;
        info!(restored, "saved overlays replayed");
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS]);

    let app = api::router(api::AppState { engine, surface })
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {err}", config.addr);
            return;
        }
    };
    info!(
        tiles = %config.tile_service_url,
        state = %config.state_path.display(),
        "dashboard server listening on http://{}",
        config.addr
    );
    if let Err(err) = axum::serve(listener, app).await {
        error!("server stopped: {err}");
    }
}

fn env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
