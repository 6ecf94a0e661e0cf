//! Live video stream: the latest-frame slot, its tracks, and the handle that owns them.

use crate::camera::CameraError;
use crate::frame::Frame;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared slot holding the most recently decoded camera frame.
///
/// Capture tracks publish into it; the sampler and enrollment read from it.
/// Natural size is `(0, 0)` until the first frame decodes.
#[derive(Clone, Default)]
pub struct VideoElement {
    current: Arc<RwLock<Option<Arc<Frame>>>>,
}

impl VideoElement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame.
    pub fn publish(&self, frame: Frame) {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(frame));
    }

    /// Dimensions of the current frame, `(0, 0)` before the first one.
    pub fn natural_size(&self) -> (u32, u32) {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or((0, 0), |f| (f.width, f.height))
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the current frame; natural size returns to `(0, 0)`.
    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// One source feeding a [`VideoElement`] (e.g. a capture thread).
pub trait Track: Send {
    fn label(&self) -> &str;
    /// Stop producing frames and release the underlying device. Idempotent.
    fn stop(&mut self);
}

/// An open grant to read frames from the capture device.
///
/// Dropping the handle stops every track, so the device is released on
/// every exit path.
pub struct StreamHandle {
    video: VideoElement,
    tracks: Vec<Box<dyn Track>>,
    open: bool,
}

impl StreamHandle {
    pub fn new(video: VideoElement, tracks: Vec<Box<dyn Track>>) -> Self {
        Self {
            video,
            tracks,
            open: true,
        }
    }

    pub fn video(&self) -> &VideoElement {
        &self.video
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Stop all tracks. Safe to call more than once.
    pub fn stop(&mut self) {
        if !self.open {
            return;
        }
        for track in &mut self.tracks {
            tracing::debug!(track = track.label(), "stopping track");
            track.stop();
        }
        self.video.clear();
        self.open = false;
        tracing::info!(tracks = self.tracks.len(), "stream closed");
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Host capability for requesting video-only capture.
pub trait MediaDevices: Send + Sync {
    fn open_video(&self) -> Result<StreamHandle, CameraError>;
}
