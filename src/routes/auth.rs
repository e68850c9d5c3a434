use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::ShopSession,
    error::{AppError, AppResult},
    models::Shop,
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub shop_id: String,
    #[serde(default)]
    pub operator: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub shop: Shop,
}

/// Opens a session for a service center. There is no password step: the
/// terminal picks its center and optionally records who is operating it.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let shop = state
        .catalog
        .shop(&request.shop_id)
        .cloned()
        .ok_or_else(|| AppError::bad_request(format!("unknown center '{}'", request.shop_id)))?;

    let operator = request
        .operator
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let access_token = state
        .sessions
        .generate_token(&shop.id, &shop.name, operator)?;

    info!(shop_id = %shop.id, operator = operator.unwrap_or("-"), "session opened");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.sessions.expiry_seconds(),
        shop,
    }))
}

pub async fn me(session: ShopSession) -> Json<ShopSession> {
    Json(session)
}
