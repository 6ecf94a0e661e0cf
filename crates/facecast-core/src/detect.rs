//! The detection capability consumed by the pipeline, and its in-process variant.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{
    AnnotationBatch, BoundingBox, CosineMatcher, Detection, Embedding, EnrolledFace, FaceBox,
    Matcher, UNKNOWN_LABEL,
};
use async_trait::async_trait;
use facecast_hw::Frame;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detection unavailable: {0}")]
    Unavailable(String),
    #[error("detection timed out after {0:?}")]
    TimedOut(Duration),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Turns one frame into the annotation batch for that frame.
///
/// Implementations must tag the batch with `frame.sequence`.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn detect(&self, frame: Arc<Frame>) -> Result<AnnotationBatch, DetectionError>;
}

/// How the local detector names the faces it finds.
#[derive(Debug, Clone)]
pub enum Labeling {
    /// Every face carries the same label (the name being enrolled).
    Fixed(String),
    /// Faces are matched against enrolled embeddings.
    Gallery { faces: Vec<EnrolledFace>, threshold: f32 },
}

struct LocalModels {
    detector: FaceDetector,
    recognizer: Option<FaceRecognizer>,
    labeling: Labeling,
}

impl LocalModels {
    fn run(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let boxes = self.detector.detect(frame)?;
        let recognizer = &mut self.recognizer;
        Ok(assign_labels(&boxes, frame, &self.labeling, |bbox| {
            let recognizer = recognizer.as_mut()?;
            match recognizer.extract(frame, bbox) {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    tracing::debug!(error = %e, "embedding failed, labeling face unknown");
                    None
                }
            }
        }))
    }
}

/// In-process detector: SCRFD boxes, optionally ArcFace + gallery matching.
///
/// Inference runs on the blocking pool so the pipeline task stays responsive.
#[derive(Clone)]
pub struct LocalDetector {
    models: Arc<Mutex<LocalModels>>,
}

impl LocalDetector {
    pub fn new(detector: FaceDetector, recognizer: Option<FaceRecognizer>, labeling: Labeling) -> Self {
        if matches!(labeling, Labeling::Gallery { .. }) && recognizer.is_none() {
            tracing::warn!("gallery labeling without a recognizer; every face will be unknown");
        }
        Self {
            models: Arc::new(Mutex::new(LocalModels {
                detector,
                recognizer,
                labeling,
            })),
        }
    }

    /// Embedding of the largest face in `frame`, if any face is found and a
    /// recognizer is loaded.
    pub async fn embed_largest_face(&self, frame: Arc<Frame>) -> Result<Option<Embedding>, DetectionError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut models = this.lock();
            let models = &mut *models;
            let Some(recognizer) = models.recognizer.as_mut() else {
                return Ok(None);
            };
            let boxes = models.detector.detect(&frame)?;
            let Some(largest) = boxes
                .iter()
                .max_by(|a, b| (a.width * a.height).total_cmp(&(b.width * b.height)))
            else {
                return Ok(None);
            };
            Ok(Some(recognizer.extract(&frame, largest)?))
        })
        .await
        .map_err(|e| DetectionError::Unavailable(format!("inference task failed: {e}")))?
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LocalModels> {
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Detector for LocalDetector {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn detect(&self, frame: Arc<Frame>) -> Result<AnnotationBatch, DetectionError> {
        let this = self.clone();
        let sequence = frame.sequence;
        let detections = tokio::task::spawn_blocking(move || this.lock().run(&frame))
            .await
            .map_err(|e| DetectionError::Unavailable(format!("inference task failed: {e}")))??;
        Ok(AnnotationBatch::new(sequence, detections))
    }
}

/// Name each detected box according to `labeling`.
///
/// `embed` is only called in gallery mode; `None` labels the face unknown.
fn assign_labels(
    boxes: &[BoundingBox],
    frame: &Frame,
    labeling: &Labeling,
    mut embed: impl FnMut(&BoundingBox) -> Option<Embedding>,
) -> Vec<Detection> {
    boxes
        .iter()
        .map(|bbox| {
            let label = match labeling {
                Labeling::Fixed(name) => name.clone(),
                Labeling::Gallery { faces, threshold } => match embed(bbox) {
                    Some(candidate) => CosineMatcher
                        .compare(&candidate, faces, *threshold)
                        .display_label()
                        .to_string(),
                    None => UNKNOWN_LABEL.to_string(),
                },
            };
            Detection {
                label,
                face: FaceBox::from_bbox(bbox, frame.width, frame.height),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32) -> BoundingBox {
        BoundingBox { x, y, width: 50.0, height: 60.0, confidence: 0.9, landmarks: None }
    }

    fn face(label: &str, values: Vec<f32>) -> EnrolledFace {
        EnrolledFace {
            id: label.into(),
            label: label.into(),
            embedding: Embedding { values, model_version: None },
            created_at: String::new(),
        }
    }

    #[test]
    fn test_fixed_labeling_names_every_box() {
        let frame = Frame::filled(320, 240, [0, 0, 0], 4);
        let boxes = [bbox(10.0, 20.0), bbox(100.0, 20.0)];
        let mut calls = 0;
        let dets = assign_labels(&boxes, &frame, &Labeling::Fixed("Dana".into()), |_| {
            calls += 1;
            None
        });
        assert_eq!(calls, 0);
        assert_eq!(dets.len(), 2);
        assert!(dets.iter().all(|d| d.label == "Dana"));
        assert_eq!(dets[0].face, FaceBox { top: 20, left: 10, right: 60, bottom: 80 });
    }

    #[test]
    fn test_gallery_labeling_matches_or_unknown() {
        let frame = Frame::filled(320, 240, [0, 0, 0], 4);
        let labeling = Labeling::Gallery {
            faces: vec![face("alice", vec![1.0, 0.0]), face("bob", vec![0.0, 1.0])],
            threshold: 0.4,
        };
        let boxes = [bbox(0.0, 0.0), bbox(100.0, 0.0), bbox(200.0, 0.0)];
        let mut candidates = vec![
            Some(Embedding { values: vec![0.1, 0.9], model_version: None }),
            Some(Embedding { values: vec![-1.0, -1.0], model_version: None }),
            None,
        ]
        .into_iter();

        let dets = assign_labels(&boxes, &frame, &labeling, |_| candidates.next().flatten());
        let labels: Vec<_> = dets.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["bob", UNKNOWN_LABEL, UNKNOWN_LABEL]);
    }
}
