use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::{models::IntakeRecord, state::AppState};

#[derive(Serialize)]
pub struct DashboardResponse {
    pub total: usize,
    pub today: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub recent: Vec<IntakeRecord>,
}

/// Counters plus the most recent registrations, newest first.
pub async fn dashboard(State(state): State<AppState>) -> Json<DashboardResponse> {
    let records = state.store.records().await;
    let today = Utc::now().date_naive();

    let total = records.len();
    let today_count = records
        .iter()
        .filter(|record| record.registered_at.date_naive() == today)
        .count();
    let in_progress = records
        .iter()
        .filter(|record| record.status.is_in_progress())
        .count();
    let completed = records
        .iter()
        .filter(|record| record.status == crate::models::IntakeStatus::Completed)
        .count();

    let mut recent = records;
    recent.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
    recent.truncate(state.config.recent_limit);

    Json(DashboardResponse {
        total,
        today: today_count,
        in_progress,
        completed,
        recent,
    })
}
