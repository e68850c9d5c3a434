use std::sync::Arc;

use crate::{
    auth::session::SessionService, capture::CameraDevice, config::AppConfig, media::MediaStorage,
    models::ShopCatalog, recognizer::PlateRecognizer, store::IntakeStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<IntakeStore>,
    pub config: Arc<AppConfig>,
    pub catalog: Arc<ShopCatalog>,
    pub media: Arc<dyn MediaStorage>,
    pub sessions: SessionService,
    pub camera: Option<Arc<dyn CameraDevice>>,
    pub recognizer: Option<Arc<dyn PlateRecognizer>>,
}

impl AppState {
    pub fn new(
        store: Arc<IntakeStore>,
        config: AppConfig,
        catalog: ShopCatalog,
        media: Arc<dyn MediaStorage>,
        sessions: SessionService,
        camera: Option<Arc<dyn CameraDevice>>,
        recognizer: Option<Arc<dyn PlateRecognizer>>,
    ) -> Self {
        Self {
            store,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            media,
            sessions,
            camera,
            recognizer,
        }
    }
}
