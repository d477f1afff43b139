use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    apikey::KeyInfo,
    card::{self, CardError, CardRequest},
    util, AppState,
};

const NAME_MAX_LEN: usize = 20;
const ROLE_MAX_LEN: usize = 15;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn err(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "success": false, "error": msg.into() })))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub id_number: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    /// Photo as a data URL (`data:image/...;base64,...`) or bare base64.
    pub photo: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateKeyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeKeyRequest {
    pub api_key: Option<String>,
}

fn extract_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn require_api_key(st: &AppState, headers: &HeaderMap) -> Result<KeyInfo, ApiError> {
    let key = extract_header(headers, "x-api-key").ok_or_else(|| {
        err(
            StatusCode::UNAUTHORIZED,
            "API key required. Please provide X-API-Key header.",
        )
    })?;
    st.api_keys
        .validate(&key)
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "Invalid or inactive API key."))
}

fn require_admin_key(st: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let forbidden = || err(StatusCode::FORBIDDEN, "Admin access required. Invalid admin key.");
    let Some(expected) = st.admin_key.as_deref() else {
        // no ADMIN_KEY configured: key management stays locked
        return Err(forbidden());
    };
    match extract_header(headers, "x-admin-key") {
        Some(presented) if presented == expected => Ok(()),
        _ => Err(forbidden()),
    }
}

#[utoipa::path(get, path = "/", tag = "cardgen", responses((status = 200, body = serde_json::Value)))]
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "ID Card Generator API",
        "version": env!("CARGO_PKG_VERSION"),
        "documentation": "/docs",
        "endpoints": {
            "generate": "POST /api/generate",
            "download": "GET /api/download/{cardId}",
            "validateKey": "GET /api/keys/validate",
            "createKey": "POST /api/keys/create (Admin)",
            "listKeys": "GET /api/keys/list (Admin)",
            "revokeKey": "POST /api/keys/revoke (Admin)"
        }
    }))
}

#[utoipa::path(get, path = "/health", tag = "cardgen", responses((status = 200, body = serde_json::Value)))]
pub async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": st.started.elapsed().as_secs(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/generate",
    tag = "cardgen",
    request_body = GenerateRequest,
    params(("X-API-Key" = String, Header, description = "API key")),
    responses(
        (status = 200, body = serde_json::Value),
        (status = 400, description = "Missing required fields"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Render failure")
    )
)]
pub async fn generate(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = require_api_key(&st, &headers)?;

    let mut card_req = CardRequest {
        name: util::truncate_with_ellipsis(req.name.unwrap_or_default(), NAME_MAX_LEN),
        role: util::truncate_with_ellipsis(req.role.unwrap_or_default(), ROLE_MAX_LEN),
        id_number: req.id_number.unwrap_or_default(),
        valid_from: req.valid_from,
        valid_to: req.valid_to,
        photo: None,
    };

    // incomplete requests fail before the photo is even decoded
    if let Err(CardError::Validation(fields)) = card::validate(&card_req) {
        return Err(err(StatusCode::BAD_REQUEST, format!("Missing required fields: {fields}")));
    }

    card_req.photo = match req.photo.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => Some(
            util::b64_decode(s)
                .ok_or_else(|| err(StatusCode::INTERNAL_SERVER_ERROR, "failed to decode photo image"))?,
        ),
        None => None,
    };

    let card = card::render(&st.assets, &card_req).map_err(|e| match e {
        CardError::Validation(fields) => {
            err(StatusCode::BAD_REQUEST, format!("Missing required fields: {fields}"))
        }
        e => {
            error!(error = %e, "card render failed");
            err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    })?;

    st.cards.put(&card.id, &card.png).map_err(|e| {
        error!(error = %e, "failed to persist card");
        err(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate card")
    })?;

    info!(key = %key.name, card_id = %card.id, "card generated");
    Ok(Json(json!({
        "success": true,
        "data": {
            "cardId": card.id,
            "downloadUrl": format!("/api/download/{}", card.id),
            "expiresIn": "24 hours",
        }
    })))
}

#[utoipa::path(
    get,
    path = "/api/download/{card_id}",
    tag = "cardgen",
    params(
        ("card_id" = String, Path, description = "Card id returned by /api/generate"),
        ("X-API-Key" = String, Header, description = "API key")
    ),
    responses(
        (status = 200, description = "Card PNG", content_type = "image/png"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Card not found or expired")
    )
)]
pub async fn download(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(card_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let _ = require_api_key(&st, &headers)?;

    // ids are UUIDs; anything else never names a stored card
    let id = Uuid::parse_str(&card_id)
        .map_err(|_| err(StatusCode::NOT_FOUND, "Card not found or expired"))?;

    let png = st
        .cards
        .get(&id.to_string())
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "Card not found or expired"))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

#[utoipa::path(
    get,
    path = "/api/keys/validate",
    tag = "cardgen",
    params(("X-API-Key" = String, Header, description = "API key")),
    responses((status = 200, body = serde_json::Value), (status = 401, description = "Unauthorized"))
)]
pub async fn keys_validate(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let key = require_api_key(&st, &headers)?;
    Ok(Json(json!({
        "success": true,
        "valid": true,
        "keyInfo": { "name": key.name, "createdAt": key.created_at }
    })))
}

#[utoipa::path(
    post,
    path = "/api/keys/create",
    tag = "cardgen",
    request_body = CreateKeyRequest,
    params(("X-Admin-Key" = String, Header, description = "Admin key")),
    responses(
        (status = 200, body = serde_json::Value),
        (status = 400, description = "Key name is required"),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn keys_create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_key(&st, &headers)?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(StatusCode::BAD_REQUEST, "Key name is required"))?;

    let info = st
        .api_keys
        .create(name, req.description.as_deref().unwrap_or(""))
        .map_err(|e| {
            error!(error = %e, "failed to create api key");
            err(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create API key")
        })?;

    info!(key = %info.name, "api key created");
    Ok(Json(json!({
        "success": true,
        "data": {
            "apiKey": info.key,
            "name": info.name,
            "description": info.description,
            "createdAt": info.created_at,
        }
    })))
}

#[utoipa::path(
    get,
    path = "/api/keys/list",
    tag = "cardgen",
    params(("X-Admin-Key" = String, Header, description = "Admin key")),
    responses((status = 200, body = serde_json::Value), (status = 403, description = "Admin access required"))
)]
pub async fn keys_list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_key(&st, &headers)?;
    Ok(Json(json!({ "success": true, "data": st.api_keys.list() })))
}

#[utoipa::path(
    post,
    path = "/api/keys/revoke",
    tag = "cardgen",
    request_body = RevokeKeyRequest,
    params(("X-Admin-Key" = String, Header, description = "Admin key")),
    responses(
        (status = 200, body = serde_json::Value),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "API key not found")
    )
)]
pub async fn keys_revoke(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RevokeKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_key(&st, &headers)?;

    let key = req.api_key.as_deref().unwrap_or("");
    let revoked = st.api_keys.revoke(key).map_err(|e| {
        error!(error = %e, "failed to revoke api key");
        err(StatusCode::INTERNAL_SERVER_ERROR, "Failed to revoke key")
    })?;

    if revoked {
        info!("api key revoked");
        Ok(Json(json!({ "success": true, "message": "API key revoked successfully" })))
    } else {
        Err(err(StatusCode::NOT_FOUND, "API key not found"))
    }
}
