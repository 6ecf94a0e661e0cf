//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::stream::{MediaDevices, StreamHandle, Track, VideoElement};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion JPEG, one JPEG per buffer.
    Mjpeg,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub card: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera by path (e.g., "/dev/video0") and request the given size.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV; drivers that can't do it hand back what they have.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpeg
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG, GREY, or Y16)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            card: caps.card.clone(),
            fourcc,
            pixel_format,
        })
    }

    /// Convert a raw buffer to RGB based on the negotiated format.
    fn decode(&self, buf: &[u8]) -> Result<(Vec<u8>, u32, u32), CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map(|rgb| (rgb, self.width, self.height)),
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height)
                .map(|rgb| (rgb, self.width, self.height)),
            PixelFormat::Y16 => frame::y16_to_rgb(buf, self.width, self.height)
                .map(|rgb| (rgb, self.width, self.height)),
            PixelFormat::Mjpeg => frame::mjpeg_to_rgb(buf),
        };
        converted.map_err(|e| CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format)))
    }

    /// Start streaming on a dedicated thread that publishes every decoded
    /// frame into `video`. The camera is owned by the thread until the
    /// returned track is stopped.
    pub fn start(self, video: VideoElement) -> Result<CaptureTrack, CameraError> {
        let label = format!("{} ({})", self.card, self.device_path);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("facecast-capture".into())
            .spawn(move || self.capture_loop(&video, &thread_stop))
            .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?;

        Ok(CaptureTrack {
            label,
            stop,
            handle: Some(handle),
        })
    }

    fn capture_loop(&self, video: &VideoElement, stop: &AtomicBool) {
        let mut stream = match MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(device = %self.device_path, error = %e, "failed to create mmap stream");
                return;
            }
        };
        stream.set_timeout(self.dequeue_timeout());

        tracing::info!(device = %self.device_path, "capture thread started");

        let published = pump_frames(stop, |frame| video.publish(frame), || {
            let e = match stream.next() {
                Ok((buf, meta)) => {
                    let decoded = self.decode(buf).and_then(|(rgb, w, h)| {
                        Frame::new(rgb, w, h, u64::from(meta.sequence))
                            .map_err(|e| CameraError::CaptureFailed(e.to_string()))
                    });
                    return match decoded {
                        Ok(frame) => Ok(Some(frame)),
                        Err(e) => {
                            tracing::debug!(seq = meta.sequence, error = %e, "dropping undecodable frame");
                            Ok(None)
                        }
                    };
                }
                Err(e) => e,
            };
            if e.kind() != io::ErrorKind::TimedOut {
                return Err(CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")));
            }
            tracing::trace!(device = %self.device_path, "no frame before dequeue timeout");
            // The timed-out call already requeued its buffer; restart streaming
            // so the next dequeue queues every buffer afresh.
            Stream::stop(&mut stream)
                .map(|()| None)
                .map_err(|e| CameraError::CaptureFailed(format!("failed to restart stream: {e}")))
        });

        tracing::info!(device = %self.device_path, published, "capture thread exiting");
    }

    /// Two frame periods at the device's current rate, bounded below.
    fn dequeue_timeout(&self) -> Duration {
        let period = self
            .device
            .params()
            .ok()
            .map(|params| (params.interval.numerator, params.interval.denominator));
        dequeue_timeout_for(period)
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Floor for the per-dequeue timeout.
const MIN_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Used when the device does not report a frame interval.
const FALLBACK_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Dequeue timeout for a frame interval of `numerator/denominator` seconds.
fn dequeue_timeout_for(interval: Option<(u32, u32)>) -> Duration {
    match interval {
        Some((num, den)) if num > 0 && den > 0 => {
            let period = Duration::from_secs_f64(f64::from(num) / f64::from(den));
            (period * 2).max(MIN_DEQUEUE_TIMEOUT)
        }
        _ => FALLBACK_DEQUEUE_TIMEOUT,
    }
}

/// Pull frames with `next` and hand them to `publish` until `stop` is set
/// or `next` fails. `Ok(None)` means nothing arrived this round, either a
/// dequeue timeout or an undecodable buffer, and the stop flag is checked
/// again. Returns the number of frames published.
fn pump_frames<N, P>(stop: &AtomicBool, mut publish: P, mut next: N) -> u64
where
    N: FnMut() -> Result<Option<Frame>, CameraError>,
    P: FnMut(Frame),
{
    let mut published = 0u64;
    while !stop.load(Ordering::Acquire) {
        match next() {
            Ok(Some(frame)) => {
                publish(frame);
                published += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "capture stopped");
                break;
            }
        }
    }
    published
}

/// Capture thread feeding a [`VideoElement`].
pub struct CaptureTrack {
    label: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Track for CaptureTrack {
    fn label(&self) -> &str {
        &self.label
    }

    /// Signal the thread and join it; the device closes when the thread exits.
    /// Dequeues time out, so this returns within one frame or one
    /// [`dequeue_timeout_for`] window even when the device stalls.
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(track = %self.label, "capture thread panicked");
            }
        }
    }
}

/// [`MediaDevices`] backed by a single V4L2 device path.
#[derive(Debug, Clone)]
pub struct V4lDevices {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
}

impl MediaDevices for V4lDevices {
    fn open_video(&self) -> Result<StreamHandle, CameraError> {
        let camera = Camera::open(&self.device_path, self.width, self.height)?;
        let video = VideoElement::new();
        let track = camera.start(video.clone())?;
        Ok(StreamHandle::new(video, vec![Box::new(track)]))
    }
}
