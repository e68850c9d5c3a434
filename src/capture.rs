//! Camera device seam.
//!
//! The wizard can capture photos straight from a camera attached to the
//! intake kiosk. The device is abstracted behind a trait so installations
//! without one still work (upload-only) and tests can verify the stream
//! lifecycle. A stream must be stopped exactly once; `Draft` owns the open
//! stream and releases it on close or re-acquisition.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

#[async_trait]
pub trait CameraDevice: Send + Sync + 'static {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>>;
}

#[async_trait]
pub trait CameraStream: Send {
    /// Grabs one encoded frame (JPEG/PNG bytes) from the live stream.
    async fn grab_frame(&mut self) -> Result<Vec<u8>>;

    /// Releases the underlying device. Callers must invoke this exactly once.
    fn stop(&mut self);
}

/// Serves frames from a directory of image files, cycling in filename order.
/// Stands in for a physical camera on kiosks that sync photos from a phone
/// or dashcam into a watched folder.
pub struct FrameDirCamera {
    dir: PathBuf,
}

impl FrameDirCamera {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl CameraDevice for FrameDirCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>> {
        let dir = self.dir.clone();
        let mut frames: Vec<PathBuf> = tokio::task::spawn_blocking(move || -> Result<_> {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("failed to read camera frames dir {}", dir.display()))?;
            let mut files = Vec::new();
            for entry in entries {
                let path = entry?.path();
                if path.is_file() {
                    files.push(path);
                }
            }
            Ok(files)
        })
        .await
        .context("camera scan task panicked")??;

        frames.sort();
        if frames.is_empty() {
            bail!("no frames available in camera directory");
        }

        Ok(Box::new(FrameDirStream {
            frames,
            next: 0,
            stopped: false,
        }))
    }
}

struct FrameDirStream {
    frames: Vec<PathBuf>,
    next: usize,
    stopped: bool,
}

#[async_trait]
impl CameraStream for FrameDirStream {
    async fn grab_frame(&mut self) -> Result<Vec<u8>> {
        if self.stopped {
            bail!("camera stream already stopped");
        }
        let path = self.frames[self.next % self.frames.len()].clone();
        self.next += 1;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read frame {}", path.display()))?;
        Ok(bytes)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
