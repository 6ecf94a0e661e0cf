//! facecast-hw: hardware abstraction for the live camera stream.
//!
//! Provides V4L2-based capture on a background track, the shared
//! latest-frame slot the pipeline samples from, and RGB frame conversion.

pub mod camera;
pub mod frame;
pub mod stream;

pub use camera::{Camera, CameraError, PixelFormat, V4lDevices};
pub use frame::{Frame, FrameError, StillFormat};
pub use stream::{MediaDevices, StreamHandle, Track, VideoElement};
