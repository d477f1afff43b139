use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{info, warn};

use cardgen_backend::{apikey::KeyStore, card::Assets, router, store::CardStore, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3000);

    // Shared assets load once; a missing template or font aborts here,
    // before the listener binds.
    let assets_dir = std::env::var("ASSETS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("assets"));
    let assets = Assets::load(&assets_dir).expect("failed to load card assets");

    let temp_dir = std::env::var("TEMP_DIR").unwrap_or_else(|_| "temp".to_string());
    let cards = CardStore::new(&temp_dir).expect("failed to create card temp dir");

    let api_keys_path =
        std::env::var("API_KEYS_PATH").unwrap_or_else(|_| "data/api_keys.json".to_string());
    let api_keys = KeyStore::load(api_keys_path);

    let admin_key = std::env::var("ADMIN_KEY").ok().filter(|s| !s.is_empty());
    if admin_key.is_none() {
        warn!("ADMIN_KEY not set; key management endpoints are disabled");
    }

    let max_age_hours: u64 = std::env::var("MAX_FILE_AGE_HOURS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(24);

    let state = Arc::new(AppState {
        assets,
        cards,
        api_keys,
        admin_key,
        max_file_age: Duration::from_secs(max_age_hours * 3600),
        started: Instant::now(),
    });

    // hourly sweep of expired cards
    let sweep = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            ticker.tick().await;
            let removed = sweep.cards.delete_expired(sweep.max_file_age);
            if removed > 0 {
                info!(removed, "expired card sweep");
            }
        }
    });

    let app = router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse().expect("bind addr");
    info!("Starting cardgen-backend on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
