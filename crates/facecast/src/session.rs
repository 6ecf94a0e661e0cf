//! Camera session lifecycle: at most one open stream, released on stop and drop.

use facecast_hw::{CameraError, MediaDevices, StreamHandle, VideoElement};
use std::sync::Arc;
use tokio::sync::watch;

/// Lets the frame consumer announce that the camera delivered its first frame.
#[derive(Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    pub fn mark_ready(&self) {
        self.tx.send_if_modified(|ready| !std::mem::replace(ready, true));
    }
}

/// What a started session hands to the pipeline.
pub struct CameraFeed {
    pub video: VideoElement,
    pub ready: ReadySignal,
}

pub struct Session<D> {
    devices: D,
    handle: Option<StreamHandle>,
    ready: Arc<watch::Sender<bool>>,
}

impl<D: MediaDevices> Session<D> {
    pub fn new(devices: D) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            devices,
            handle: None,
            ready: Arc::new(tx),
        }
    }

    /// Open the camera. A running stream is stopped first.
    ///
    /// On failure the session stays stopped.
    pub fn start(&mut self) -> Result<CameraFeed, CameraError> {
        self.stop();
        let handle = self.devices.open_video().map_err(|e| {
            tracing::error!(error = %e, "camera unavailable");
            e
        })?;
        tracing::info!(tracks = handle.track_count(), "camera stream started");
        let video = handle.video().clone();
        self.handle = Some(handle);
        Ok(CameraFeed {
            video,
            ready: ReadySignal {
                tx: Arc::clone(&self.ready),
            },
        })
    }

    /// Release the stream if one is open. No-op otherwise.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
        }
        self.ready.send_if_modified(|ready| std::mem::replace(ready, false));
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(StreamHandle::is_open)
    }

    /// Observe the "camera ready" state.
    pub fn camera_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }
}
