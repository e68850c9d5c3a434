//! Shared integration test harness.
//!
//! Builds the full router on top of a temp data directory, with fake
//! camera/recognizer implementations so the wizard flows run end to end
//! without external binaries. Jobs are flushed explicitly via the worker's
//! drain method instead of a background task.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use glassdrive::auth::session::SessionService;
use glassdrive::capture::{CameraDevice, CameraStream};
use glassdrive::config::{AppConfig, PlateFallback};
use glassdrive::media::{FsStorage, MediaStorage};
use glassdrive::models::ShopCatalog;
use glassdrive::recognizer::{PlateRecognizer, Recognition, RecognizerError};
use glassdrive::routes::create_router;
use glassdrive::state::AppState;
use glassdrive::store::IntakeStore;
use glassdrive::{default_handlers, Worker};

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
});

pub struct TestApp {
    pub router: Router,
    pub worker: Worker,
    pub camera_stops: Option<Arc<AtomicUsize>>,
    _data_dir: TempDir,
}

pub struct TestAppBuilder {
    require_policy: bool,
    plate_fallback: PlateFallback,
    camera: Option<Arc<FakeCamera>>,
    recognizer: Option<Arc<FakeRecognizer>>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            require_policy: true,
            plate_fallback: PlateFallback::Honest,
            camera: None,
            recognizer: None,
        }
    }
}

impl TestAppBuilder {
    pub fn require_policy(mut self, value: bool) -> Self {
        self.require_policy = value;
        self
    }

    pub fn plate_fallback(mut self, value: PlateFallback) -> Self {
        self.plate_fallback = value;
        self
    }

    pub fn camera(mut self, camera: Arc<FakeCamera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<FakeRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub async fn build(self) -> TestApp {
        Lazy::force(&TRACING);

        let data_dir = TempDir::new().expect("temp data dir");
        let config = AppConfig {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            data_dir: data_dir.path().to_path_buf(),
            session_secret: "integration-test-secret".to_string(),
            session_issuer: "glassdrive".to_string(),
            session_audience: "glassdrive-clients".to_string(),
            session_expiry_minutes: 60,
            cors_allowed_origin: None,
            require_policy: self.require_policy,
            plate_fallback: self.plate_fallback,
            recognizer_command: None,
            camera_frames_dir: None,
            shops_file: None,
            extraction_delay_ms: 0,
            worker_poll_interval_ms: 10,
            recent_limit: 5,
        };

        let store = Arc::new(IntakeStore::open(config.store_path()).await);
        let media: Arc<dyn MediaStorage> = Arc::new(FsStorage::new(config.media_root()));
        let sessions = SessionService::from_config(&config).expect("session service");

        let camera_stops = self.camera.as_ref().map(|camera| camera.stops.clone());
        let camera = self
            .camera
            .map(|camera| camera as Arc<dyn CameraDevice>);
        let recognizer = self
            .recognizer
            .map(|recognizer| recognizer as Arc<dyn PlateRecognizer>);

        let state = AppState::new(store, config, ShopCatalog::default(), media, sessions, camera, recognizer);
        let worker = Worker::new(
            Arc::new(state.clone()),
            default_handlers(),
            Duration::from_millis(10),
        );
        let router = create_router(state);

        TestApp {
            router,
            worker,
            camera_stops,
            _data_dir: data_dir,
        }
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        TestAppBuilder::default().build().await
    }

    pub async fn login(&self, shop_id: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "shop_id": shop_id, "operator": "test" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }

    /// Flushes every runnable background job.
    pub async fn drain_jobs(&self) {
        self.worker.drain().await.expect("job queue drain");
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("response body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn upload_file(
        &self,
        uri: &str,
        token: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> (StatusCode, Value) {
        const BOUNDARY: &str = "glassdrive-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("multipart request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("response body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn download(&self, uri: &str, token: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("response body")
            .to_bytes();
        (status, bytes.to_vec())
    }
}

/// Camera device handing out streams that cycle through canned frames and
/// count how many times they were stopped.
pub struct FakeCamera {
    frames: Vec<Vec<u8>>,
    pub stops: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn new(frames: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            frames,
            stops: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>> {
        Ok(Box::new(FakeStream {
            frames: self.frames.clone(),
            next: 0,
            stops: self.stops.clone(),
        }))
    }
}

struct FakeStream {
    frames: Vec<Vec<u8>>,
    next: usize,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl CameraStream for FakeStream {
    async fn grab_frame(&mut self) -> Result<Vec<u8>> {
        if self.frames.is_empty() {
            bail!("no frames scripted");
        }
        let frame = self.frames[self.next % self.frames.len()].clone();
        self.next += 1;
        Ok(frame)
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recognizer returning scripted results in order; once the script runs out
/// it reads nothing.
pub struct FakeRecognizer {
    scripted: Mutex<VecDeque<Recognition>>,
}

impl FakeRecognizer {
    pub fn scripted(results: &[(&str, f32)]) -> Arc<Self> {
        let scripted = results
            .iter()
            .map(|(text, confidence)| Recognition {
                text: text.to_string(),
                confidence: *confidence,
            })
            .collect();
        Arc::new(Self {
            scripted: Mutex::new(scripted),
        })
    }
}

#[async_trait]
impl PlateRecognizer for FakeRecognizer {
    async fn recognize(&self, _image: &[u8]) -> Result<Recognition, RecognizerError> {
        let next = self
            .scripted
            .lock()
            .expect("recognizer script lock")
            .pop_front();
        Ok(next.unwrap_or(Recognition {
            text: String::new(),
            confidence: 0.0,
        }))
    }
}
