use crate::config::{Config, DetectionMode};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::session::Session;
use anyhow::{Context, Result};
use facecast_core::{Detector, FileSurface, OverlayRenderer, OverlayStyle, Surface};
use facecast_hw::{CameraError, MediaDevices, V4lDevices, VideoElement};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A running camera session with its annotation pipeline.
pub struct Preview<D: MediaDevices, S> {
    session: Session<D>,
    video: VideoElement,
    stop: watch::Sender<bool>,
    task: JoinHandle<Pipeline<S>>,
}

impl Preview<V4lDevices, FileSurface> {
    /// Open the configured camera and render to the configured surface file.
    pub fn start(config: &Config, mode: DetectionMode, detector: Arc<dyn Detector>) -> Result<Self> {
        let session = Session::new(V4lDevices {
            device_path: config.camera_device.clone(),
            width: config.capture_width,
            height: config.capture_height,
        });
        let style = OverlayStyle::load(config.font_path.as_deref());
        let renderer = OverlayRenderer::new(FileSurface::new(&config.surface_path), style);
        let options = PipelineOptions {
            interval: config.sampling_interval(mode),
            timeout: config.detection_timeout(mode),
        };

        let preview = Self::launch(session, renderer, options, detector)
            .with_context(|| format!("camera {} unavailable", config.camera_device))?;
        tracing::info!(surface = %config.surface_path.display(), ?mode, "preview running");
        Ok(preview)
    }
}

impl<D: MediaDevices, S: Surface + 'static> Preview<D, S> {
    /// Start the session's camera and spawn the pipeline over it.
    pub fn launch(
        mut session: Session<D>,
        renderer: OverlayRenderer<S>,
        options: PipelineOptions,
        detector: Arc<dyn Detector>,
    ) -> Result<Self, CameraError> {
        let feed = session.start()?;
        let video = feed.video.clone();
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Pipeline::new(detector, renderer, options).run(feed, stop_rx));

        Ok(Self {
            session,
            video,
            stop,
            task,
        })
    }

    pub fn video(&self) -> &VideoElement {
        &self.video
    }

    pub fn camera_ready(&self) -> watch::Receiver<bool> {
        self.session.camera_ready()
    }

    /// Stop the pipeline, then release the camera. Returns the joined
    /// pipeline unless its task failed.
    pub async fn shutdown(mut self) -> Option<Pipeline<S>> {
        self.stop.send_replace(true);
        let pipeline = match self.task.await {
            Ok(pipeline) => {
                tracing::debug!(
                    stats = ?pipeline.stats(),
                    displayed = ?pipeline.renderer().displayed_batch().map(|b| b.sequence),
                    "pipeline joined"
                );
                Some(pipeline)
            }
            Err(e) => {
                tracing::warn!(error = %e, "pipeline task failed");
                None
            }
        };
        if self.session.is_active() {
            self.session.stop();
        }
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{alice, ScriptedDetector, Step};
    use crate::session::tests::FakeDevices;
    use facecast_core::MemorySurface;
    use facecast_hw::Frame;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_detection_and_releases_camera() {
        let devices = FakeDevices::default();
        let counters = Arc::clone(&devices.counters);
        let surface = MemorySurface::new();
        let detector = ScriptedDetector::new(vec![Step::Reply(Duration::from_millis(500), alice())]);

        let preview = Preview::launch(
            Session::new(devices),
            OverlayRenderer::new(surface.clone(), OverlayStyle::default()),
            PipelineOptions {
                interval: Duration::from_millis(100),
                timeout: Duration::from_millis(1000),
            },
            detector.clone(),
        )
        .unwrap();
        let ready = preview.camera_ready();
        preview.video().publish(Frame::filled(320, 240, [0, 0, 0], 0));

        // Detection of the first frame is still running at 150 ms.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(*ready.borrow());
        assert_eq!(detector.active.load(Ordering::SeqCst), 1);

        let pipeline = preview.shutdown().await.unwrap();
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(detector.active.load(Ordering::SeqCst), 0);
        assert!(pipeline.renderer().is_closed());
        assert!(pipeline.renderer().displayed_batch().is_none());
        assert_eq!(pipeline.stats().issued, 1);
        assert_eq!(pipeline.stats().rendered, 0);

        // Nothing reaches the surface once shut down.
        let presents = surface.present_count();
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(surface.present_count(), presents);
        assert!(pipeline.renderer().displayed_batch().is_none());
    }

    #[tokio::test]
    async fn test_launch_fails_when_camera_denied() {
        let devices = FakeDevices {
            deny: true,
            ..Default::default()
        };
        let result = Preview::launch(
            Session::new(devices),
            OverlayRenderer::new(MemorySurface::new(), OverlayStyle::default()),
            PipelineOptions {
                interval: Duration::from_millis(100),
                timeout: Duration::from_millis(1000),
            },
            ScriptedDetector::new(Vec::new()),
        );
        assert!(matches!(result, Err(CameraError::DeviceBusy)));
    }
}
