//! The annotation pipeline: sample a frame per tick, run one detection at a
//! time, render results that still belong to the displayed frame.

use crate::sampler::FrameSampler;
use crate::session::CameraFeed;
use facecast_core::{AnnotationBatch, Applied, DetectionError, Detector, OverlayRenderer, Surface, SurfaceError};
use facecast_hw::Frame;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

type Completion = (u64, Result<AnnotationBatch, DetectionError>);
type InFlight = Pin<Box<dyn Future<Output = Completion> + Send>>;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub interval: Duration,
    /// Bound on one detection call; expiry counts as a failure.
    pub timeout: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    /// Ticks with no video dimensions yet.
    pub empty_ticks: u64,
    /// Ticks skipped because a detection was still pending.
    pub busy_ticks: u64,
    pub issued: u64,
    pub rendered: u64,
    pub stale: u64,
    pub failed: u64,
}

pub struct Pipeline<S> {
    detector: Arc<dyn Detector>,
    renderer: OverlayRenderer<S>,
    sampler: FrameSampler,
    options: PipelineOptions,
    stats: PipelineStats,
}

impl<S: Surface> Pipeline<S> {
    pub fn new(detector: Arc<dyn Detector>, renderer: OverlayRenderer<S>, options: PipelineOptions) -> Self {
        Self {
            detector,
            renderer,
            sampler: FrameSampler::new(),
            options,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn renderer(&self) -> &OverlayRenderer<S> {
        &self.renderer
    }

    /// Drive the pipeline until `stop` turns true or its sender goes away.
    ///
    /// On exit the renderer is closed and any pending detection is dropped,
    /// so nothing renders after stop. Returns the pipeline for inspection.
    pub async fn run(mut self, feed: CameraFeed, mut stop: watch::Receiver<bool>) -> Self {
        tracing::info!(
            detector = self.detector.name(),
            interval_ms = self.options.interval.as_millis() as u64,
            timeout_ms = self.options.timeout.as_millis() as u64,
            "pipeline started"
        );
        self.present(|r| r.set_camera_ready(false));

        let mut ticker = tokio::time::interval(self.options.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<InFlight> = None;
        let mut ready = false;

        loop {
            let stopped = *stop.borrow();
            if stopped {
                break;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                (sequence, result) = next_completion(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.complete(sequence, result);
                }
                _ = ticker.tick() => {
                    self.stats.ticks += 1;
                    if in_flight.is_some() {
                        self.stats.busy_ticks += 1;
                        tracing::trace!("detection pending, skipping tick");
                        continue;
                    }
                    let Some(frame) = self.sampler.sample(&feed.video) else {
                        self.stats.empty_ticks += 1;
                        continue;
                    };
                    if !ready {
                        ready = true;
                        feed.ready.mark_ready();
                        self.present(|r| r.set_camera_ready(true));
                    }
                    self.present(|r| r.show_frame(Arc::clone(&frame)));
                    in_flight = Some(self.issue(frame));
                }
            }
        }

        if in_flight.take().is_some() {
            tracing::debug!("dropped pending detection on stop");
        }
        self.renderer.close();
        tracing::info!(stats = ?self.stats, "pipeline stopped");
        self
    }

    fn issue(&mut self, frame: Arc<Frame>) -> InFlight {
        self.stats.issued += 1;
        let detector = Arc::clone(&self.detector);
        let timeout = self.options.timeout;
        let sequence = frame.sequence;
        tracing::trace!(sequence, "detection issued");
        Box::pin(async move {
            let result = match tokio::time::timeout(timeout, detector.detect(frame)).await {
                Ok(result) => result,
                Err(_) => Err(DetectionError::TimedOut(timeout)),
            };
            (sequence, result)
        })
    }

    fn complete(&mut self, sequence: u64, result: Result<AnnotationBatch, DetectionError>) {
        let batch = match result {
            Ok(batch) => batch,
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(sequence, detector = self.detector.name(), error = %e, "detection failed, keeping last annotations");
                return;
            }
        };
        let faces = batch.detections.len();
        match self.renderer.apply(batch) {
            Ok(Applied::Rendered) => {
                self.stats.rendered += 1;
                tracing::debug!(sequence, faces, "annotations rendered");
            }
            Ok(Applied::Stale | Applied::Closed) => self.stats.stale += 1,
            Err(e) => tracing::warn!(sequence, error = %e, "failed to present annotations"),
        }
    }

    fn present(&mut self, draw: impl FnOnce(&mut OverlayRenderer<S>) -> Result<(), SurfaceError>) {
        if let Err(e) = draw(&mut self.renderer) {
            tracing::warn!(error = %e, "failed to present frame");
        }
    }
}

async fn next_completion(slot: &mut Option<InFlight>) -> Completion {
    match slot {
        Some(detection) => detection.await,
        None => std::future::pending().await,
    }
}
