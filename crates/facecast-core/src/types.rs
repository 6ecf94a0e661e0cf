use serde::{Deserialize, Serialize};

/// Label given to a face that matched no enrolled identity.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Raw detector output in frame pixel space, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Integer face rectangle in frame pixel coordinates, edges inclusive-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: i32,
    pub left: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FaceBox {
    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Round edge coordinates to pixels, clipped to a `width` x `height` frame.
    pub fn from_edges(top: f64, right: f64, bottom: f64, left: f64, width: u32, height: u32) -> Self {
        let clip = |v: f64, max: u32| v.clamp(0.0, f64::from(max)).round() as i32;
        Self {
            top: clip(top, height),
            right: clip(right, width),
            bottom: clip(bottom, height),
            left: clip(left, width),
        }
    }

    /// This box with every edge clamped into a `width` x `height` frame.
    pub fn clipped(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width.min(i32::MAX as u32) as i32, height.min(i32::MAX as u32) as i32);
        Self {
            top: self.top.clamp(0, h),
            left: self.left.clamp(0, w),
            right: self.right.clamp(0, w),
            bottom: self.bottom.clamp(0, h),
        }
    }

    /// Round a detector box to pixels, clipped to a `width` x `height` frame.
    pub fn from_bbox(bbox: &BoundingBox, width: u32, height: u32) -> Self {
        let (x, y) = (f64::from(bbox.x), f64::from(bbox.y));
        Self::from_edges(
            y,
            x + f64::from(bbox.width),
            y + f64::from(bbox.height),
            x,
            width,
            height,
        )
    }
}

/// One face found in a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// Identity label, [`UNKNOWN_LABEL`] when unrecognized.
    pub label: String,
    pub face: FaceBox,
}

/// All detections for one sampled frame, tagged with that frame's sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationBatch {
    pub sequence: u64,
    pub detections: Vec<Detection>,
}

impl AnnotationBatch {
    pub fn new(sequence: u64, detections: Vec<Detection>) -> Self {
        Self {
            sequence,
            detections,
        }
    }

    pub fn empty(sequence: u64) -> Self {
        Self::new(sequence, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// An enrolled identity in the local gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub id: String,
    pub label: String,
    pub embedding: Embedding,
    pub created_at: String,
}

/// Result of matching a candidate embedding against a gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best match [-1, 1].
    pub similarity: f32,
    /// ID of the matched face (if any).
    pub face_id: Option<String>,
    /// Label of the matched face (if any).
    pub label: Option<String>,
}

impl MatchResult {
    /// The label to draw: the matched identity or [`UNKNOWN_LABEL`].
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Strategy for comparing a candidate embedding against enrolled faces.
pub trait Matcher {
    fn compare(&self, candidate: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult;
}

/// Best-cosine-similarity matcher. Visits every gallery entry.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, candidate: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, face) in gallery.iter().enumerate() {
            let sim = candidate.similarity(&face.embedding);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                face_id: Some(gallery[idx].id.clone()),
                label: Some(gallery[idx].label.clone()),
            },
            _ => MatchResult {
                matched: false,
                similarity: if best_sim == f32::NEG_INFINITY { 0.0 } else { best_sim },
                face_id: None,
                label: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding { values, model_version: None }
    }

    fn enrolled(id: &str, label: &str, values: Vec<f32>) -> EnrolledFace {
        EnrolledFace {
            id: id.into(),
            label: label.into(),
            embedding: emb(values),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(emb(vec![1.0, 0.0]).similarity(&emb(vec![0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(emb(vec![0.0, 0.0]).similarity(&emb(vec![1.0, 0.0])), 0.0);
    }

    #[test]
    fn test_matcher_picks_best_entry() {
        let candidate = emb(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            enrolled("1", "bob", vec![0.0, 1.0, 0.0]),
            enrolled("2", "carol", vec![0.0, 0.0, 1.0]),
            enrolled("3", "alice", vec![1.0, 0.0, 0.0]),
        ];

        let result = CosineMatcher.compare(&candidate, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.face_id.as_deref(), Some("3"));
        assert_eq!(result.display_label(), "alice");
    }

    #[test]
    fn test_matcher_below_threshold_is_unknown() {
        let candidate = emb(vec![1.0, 0.0, 0.0]);
        let gallery = vec![enrolled("1", "bob", vec![0.0, 1.0, 0.0])];
        let result = CosineMatcher.compare(&candidate, &gallery, 0.5);
        assert!(!result.matched);
        assert_eq!(result.display_label(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_matcher_empty_gallery() {
        let result = CosineMatcher.compare(&emb(vec![1.0, 0.0]), &[], 0.5);
        assert!(!result.matched);
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_face_box_from_bbox_clips_to_frame() {
        let bbox = BoundingBox {
            x: -4.6,
            y: 10.4,
            width: 100.0,
            height: 600.0,
            confidence: 0.9,
            landmarks: None,
        };
        let face = FaceBox::from_bbox(&bbox, 640, 480);
        assert_eq!(face, FaceBox { top: 10, left: 0, right: 95, bottom: 480 });
        assert_eq!(face.width(), 95);
    }

    #[test]
    fn test_face_box_from_edges_clips_out_of_range() {
        let face = FaceBox::from_edges(-50.0, 1e12, f64::INFINITY, -1e12, 640, 480);
        assert_eq!(face, FaceBox { top: 0, left: 0, right: 640, bottom: 480 });
    }

    #[test]
    fn test_face_box_clipped() {
        let face = FaceBox { top: -3, left: 600, right: 9000, bottom: 100 };
        assert_eq!(face.clipped(640, 480), FaceBox { top: 0, left: 600, right: 640, bottom: 100 });
    }

    #[test]
    fn test_face_box_extent_saturates() {
        let face = FaceBox { top: i32::MIN, left: i32::MIN, right: i32::MAX, bottom: i32::MAX };
        assert_eq!(face.width(), i32::MAX);
        assert_eq!(face.height(), i32::MAX);
    }
}
