//! Overlay rendering: composites a base frame with its annotation batch and
//! presents the result on a display surface.

use crate::types::{AnnotationBatch, Detection};
use ab_glyph::{FontArc, PxScale};
use facecast_hw::{Frame, FrameError};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_STROKE: i32 = 2;
const LABEL_PX: f32 = 16.0;
const LABEL_GAP: i32 = 8;
const PLACEHOLDER_SIZE: (u32, u32) = (640, 360);
const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([24, 24, 24]);
const LOADING_TEXT: &str = "Loading camera...";

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("surface I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("surface encode: {0}")]
    Encode(#[from] image::ImageError),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}

/// Where composed images end up.
pub trait Surface: Send {
    fn present(&mut self, image: &RgbImage) -> Result<(), SurfaceError>;
}

/// Publishes every composed image to a JPEG file.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// reader never observes a half-written image.
#[derive(Debug, Clone)]
pub struct FileSurface {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".partial");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Surface for FileSurface {
    fn present(&mut self, image: &RgbImage) -> Result<(), SurfaceError> {
        image.save_with_format(&self.tmp_path, ImageFormat::Jpeg)?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    last: Option<RgbImage>,
    presents: usize,
}

/// Keeps the last presented image in memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemorySurface {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_image(&self) -> Option<RgbImage> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).last.clone()
    }

    pub fn present_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).presents
    }
}

impl Surface for MemorySurface {
    fn present(&mut self, image: &RgbImage) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.last = Some(image.clone());
        state.presents += 1;
        Ok(())
    }
}

/// Stroke and label settings for annotation shapes.
#[derive(Clone, Default)]
pub struct OverlayStyle {
    font: Option<FontArc>,
}

impl OverlayStyle {
    /// Load the label font. Without one, boxes are drawn unlabeled.
    pub fn load(font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|path| match std::fs::read(path) {
            Ok(bytes) => match FontArc::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid font; labels disabled");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "font not readable; labels disabled");
                None
            }
        });
        Self { font }
    }

    fn draw_detection(&self, image: &mut RgbImage, det: &Detection) {
        let face = det.face.clipped(image.width(), image.height());
        for inset in 0..BOX_STROKE {
            let w = face.width().saturating_sub(2 * inset);
            let h = face.height().saturating_sub(2 * inset);
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(face.left.saturating_add(inset), face.top.saturating_add(inset))
                .of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }

        if let Some(font) = &self.font {
            if !det.label.is_empty() {
                let y = face.top.saturating_sub(LABEL_GAP + LABEL_PX as i32).max(0);
                draw_text_mut(image, BOX_COLOR, face.left, y, PxScale::from(LABEL_PX), font, &det.label);
            }
        }
    }

    fn draw_placeholder(&self, width: u32, height: u32) -> RgbImage {
        let mut image = RgbImage::from_pixel(width, height, PLACEHOLDER_COLOR);
        if let Some(font) = &self.font {
            let x = (width as i32 / 2 - 70).max(0);
            let y = (height as i32 / 2 - LABEL_PX as i32 / 2).max(0);
            draw_text_mut(&mut image, Rgb([255, 255, 255]), x, y, PxScale::from(LABEL_PX), font, LOADING_TEXT);
        }
        image
    }
}

/// What happened to a batch handed to [`OverlayRenderer::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Rendered,
    /// The batch belongs to a frame that is no longer displayed.
    Stale,
    /// The renderer was closed.
    Closed,
}

/// Owns the render surface state: the displayed base frame and the
/// annotation batch overlaid on it.
///
/// Displayed sequence numbers never decrease. A batch renders only against
/// the base frame it was computed from; anything else is dropped and the
/// previous overlay stays visible.
pub struct OverlayRenderer<S> {
    surface: S,
    style: OverlayStyle,
    base: Option<Arc<Frame>>,
    batch: Option<AnnotationBatch>,
    camera_ready: Option<bool>,
    closed: bool,
}

impl<S: Surface> OverlayRenderer<S> {
    pub fn new(surface: S, style: OverlayStyle) -> Self {
        Self {
            surface,
            style,
            base: None,
            batch: None,
            camera_ready: None,
            closed: false,
        }
    }

    pub fn base_sequence(&self) -> Option<u64> {
        self.base.as_ref().map(|f| f.sequence)
    }

    pub fn displayed_batch(&self) -> Option<&AnnotationBatch> {
        self.batch.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Toggle the loading indicator. While not ready a placeholder is shown.
    pub fn set_camera_ready(&mut self, ready: bool) -> Result<(), SurfaceError> {
        if self.closed || self.camera_ready == Some(ready) {
            return Ok(());
        }
        self.camera_ready = Some(ready);
        if ready {
            return Ok(());
        }
        let (w, h) = self
            .base
            .as_ref()
            .map_or(PLACEHOLDER_SIZE, |f| (f.width, f.height));
        let placeholder = self.style.draw_placeholder(w, h);
        self.surface.present(&placeholder)
    }

    /// Display a newly sampled frame with the last good overlay on top.
    pub fn show_frame(&mut self, frame: Arc<Frame>) -> Result<(), SurfaceError> {
        if self.closed {
            return Ok(());
        }
        if self.base_sequence().is_some_and(|seq| frame.sequence < seq) {
            tracing::debug!(sequence = frame.sequence, "ignoring out-of-order frame");
            return Ok(());
        }
        self.base = Some(frame);
        self.redraw()
    }

    /// Overlay a batch if it belongs to the displayed frame.
    pub fn apply(&mut self, batch: AnnotationBatch) -> Result<Applied, SurfaceError> {
        if self.closed {
            tracing::debug!(sequence = batch.sequence, "renderer closed, dropping batch");
            return Ok(Applied::Closed);
        }
        let newer_than_displayed = self
            .batch
            .as_ref()
            .map_or(true, |shown| batch.sequence > shown.sequence);
        if !newer_than_displayed || self.base_sequence() != Some(batch.sequence) {
            tracing::debug!(
                sequence = batch.sequence,
                base = ?self.base_sequence(),
                "dropping stale batch"
            );
            return Ok(Applied::Stale);
        }
        self.batch = Some(batch);
        self.redraw()?;
        Ok(Applied::Rendered)
    }

    /// Stop rendering. Later frames and batches are ignored.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn redraw(&mut self) -> Result<(), SurfaceError> {
        let Some(base) = &self.base else {
            return Ok(());
        };
        let mut image = base.to_rgb_image()?;
        if let Some(batch) = &self.batch {
            for det in &batch.detections {
                self.style.draw_detection(&mut image, det);
            }
        }
        self.surface.present(&image)
    }
}
