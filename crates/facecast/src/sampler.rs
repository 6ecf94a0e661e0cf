use facecast_hw::{Frame, VideoElement};
use std::sync::Arc;

/// Snapshots the video element into sequenced frames.
#[derive(Debug, Default)]
pub struct FrameSampler {
    next_sequence: u64,
    size: (u32, u32),
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one frame at the video's current natural size.
    ///
    /// Returns `None` while the video has no dimensions yet.
    pub fn sample(&mut self, video: &VideoElement) -> Option<Arc<Frame>> {
        let (width, height) = video.natural_size();
        if width == 0 || height == 0 {
            tracing::trace!("video has no dimensions yet, skipping tick");
            return None;
        }
        let current = video.current_frame()?;

        if (current.width, current.height) != self.size {
            tracing::info!(
                width = current.width,
                height = current.height,
                previous = ?self.size,
                "sampling at new resolution"
            );
            self.size = (current.width, current.height);
        }

        self.next_sequence += 1;
        Some(Arc::new(Frame {
            data: current.data.clone(),
            width: current.width,
            height: current.height,
            timestamp: current.timestamp,
            sequence: self.next_sequence,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_until_video_has_size() {
        let video = VideoElement::new();
        let mut sampler = FrameSampler::new();
        assert!(sampler.sample(&video).is_none());
        assert!(sampler.sample(&video).is_none());

        video.publish(Frame::filled(640, 480, [1, 2, 3], 99));
        let frame = sampler.sample(&video).unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(frame.sequence, 1);
        assert_eq!(&frame.data[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_sequences_increase_and_follow_resolution() {
        let video = VideoElement::new();
        let mut sampler = FrameSampler::new();
        video.publish(Frame::filled(320, 240, [0, 0, 0], 0));
        let a = sampler.sample(&video).unwrap();
        video.publish(Frame::filled(1280, 720, [0, 0, 0], 0));
        let b = sampler.sample(&video).unwrap();

        assert!(b.sequence > a.sequence);
        assert_eq!(sampler.size, (1280, 720));
        assert_eq!(b.data.len(), 1280 * 720 * 3);
    }

    #[test]
    fn test_cleared_video_is_skipped() {
        let video = VideoElement::new();
        let mut sampler = FrameSampler::new();
        video.publish(Frame::filled(8, 8, [0, 0, 0], 0));
        assert!(sampler.sample(&video).is_some());
        video.clear();
        assert!(sampler.sample(&video).is_none());
    }
}
