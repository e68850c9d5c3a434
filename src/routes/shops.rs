use axum::{extract::State, Json};

use crate::{models::Shop, state::AppState};

pub async fn list_shops(State(state): State<AppState>) -> Json<Vec<Shop>> {
    Json(state.catalog.shops.clone())
}

pub async fn list_services(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.catalog.services.clone())
}
