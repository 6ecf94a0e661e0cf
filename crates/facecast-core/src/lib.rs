//! facecast-core: face detection, recognition and overlay rendering.
//!
//! SCRFD finds faces and ArcFace embeds them, both on ONNX Runtime.
//! The [`Detector`] trait is the seam the annotation pipeline depends on;
//! [`OverlayRenderer`] draws its results onto the display surface.

pub mod alignment;
pub mod detect;
pub mod detector;
pub mod gallery;
pub mod recognizer;
pub mod render;
pub mod types;

pub use detect::{DetectionError, Detector, Labeling, LocalDetector};
pub use detector::{DetectorError, FaceDetector};
pub use gallery::{Gallery, GalleryError};
pub use recognizer::{FaceRecognizer, RecognizerError};
pub use render::{Applied, FileSurface, MemorySurface, OverlayRenderer, OverlayStyle, Surface, SurfaceError};
pub use types::{AnnotationBatch, BoundingBox, Detection, Embedding, EnrolledFace, FaceBox, UNKNOWN_LABEL};
