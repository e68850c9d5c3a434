use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::ShopSession, state::AppState};

pub mod auth;
pub mod dashboard;
pub mod health;
pub mod intakes;
pub mod records;
pub mod shops;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let shops_routes = Router::new()
        .route("/", get(shops::list_shops))
        .route("/services", get(shops::list_services));

    let intakes_routes = Router::new()
        .route("/", post(intakes::open_draft))
        .route(
            "/:id",
            get(intakes::get_draft)
                .patch(intakes::update_draft)
                .delete(intakes::abort_draft),
        )
        .route("/:id/photos", post(intakes::upload_photo))
        .route("/:id/photos/:photo_id", axum::routing::delete(intakes::delete_photo))
        .route("/:id/frontal", patch(intakes::set_frontal))
        .route("/:id/camera/start", post(intakes::camera_start))
        .route("/:id/camera/capture", post(intakes::camera_capture))
        .route("/:id/camera/stop", post(intakes::camera_stop))
        .route("/:id/documents/:kind", post(intakes::upload_document))
        .route("/:id/documents/policy/skip", post(intakes::skip_policy))
        .route("/:id/advance", post(intakes::advance_step))
        .route("/:id/back", post(intakes::back_step))
        .route("/:id/finish", post(intakes::finish));

    let records_routes = Router::new()
        .route("/", get(records::list_records))
        .route(
            "/:id",
            get(records::get_record),
        )
        .route("/:id/status", patch(records::update_status))
        .route("/:id/photos/:photo_id", get(records::download_photo));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/shops", shops_routes)
        .nest("/api/intakes", intakes_routes)
        .nest("/api/records", records_routes)
        .route("/api/dashboard", get(dashboard::dashboard))
        .layer(middleware::from_extractor_with_state::<ShopSession, _>(
            protected_state,
        ));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
