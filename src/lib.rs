pub mod api;
pub mod apikey;
pub mod barcode;
pub mod card;
pub mod openapi;
pub mod store;
pub mod util;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub struct AppState {
    pub assets: card::Assets,
    pub cards: store::CardStore,
    pub api_keys: apikey::KeyStore,
    pub admin_key: Option<String>,
    pub max_file_age: Duration,
    pub started: Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Swagger UI + OpenAPI schema
        .merge(SwaggerUi::new("/docs").url("/openapi.json", openapi::ApiDoc::openapi()))
        .route("/", get(api::index))
        .route("/health", get(api::health))
        // API
        .route("/api/generate", post(api::generate))
        .route("/api/download/{card_id}", get(api::download))
        .route("/api/keys/validate", get(api::keys_validate))
        .route("/api/keys/create", post(api::keys_create))
        .route("/api/keys/list", get(api::keys_list))
        .route("/api/keys/revoke", post(api::keys_revoke))
        .with_state(state)
}
