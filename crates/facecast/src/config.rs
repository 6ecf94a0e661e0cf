use facecast_client::{DEFAULT_QUERY_URL, DEFAULT_RECOGNIZE_URL, DEFAULT_REGISTER_URL};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

/// Which detector drives the overlay, and therefore the sampling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Frames go to the recognition service.
    Remote,
    /// Frames are processed in-process.
    Local,
}

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture size; the driver may pick another.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Local gallery of enrolled embeddings. `None` disables it.
    pub gallery_path: Option<PathBuf>,
    /// Cosine similarity threshold for a positive local match.
    pub similarity_threshold: f32,
    pub recognize_url: String,
    pub register_url: String,
    pub query_url: String,
    pub remote_interval: Duration,
    pub local_interval: Duration,
    /// Bound on a single detection call. Defaults to the sampling interval.
    pub detection_timeout: Option<Duration>,
    /// Timeout for enrollment and question requests.
    pub http_timeout: Duration,
    /// Where the annotated preview is published.
    pub surface_path: PathBuf,
    pub font_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `FACECAST_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = get("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facecast");

        let runtime_dir = get("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        // An empty value switches the optional paths off.
        let optional_path = |key: &str, default: PathBuf| match get(key) {
            Some(v) if v.is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(default),
        };

        Self {
            camera_device: get("FACECAST_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            capture_width: parse_or(&get, "FACECAST_CAPTURE_WIDTH", 640),
            capture_height: parse_or(&get, "FACECAST_CAPTURE_HEIGHT", 480),
            model_dir: get("FACECAST_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("models")),
            gallery_path: optional_path("FACECAST_GALLERY_PATH", data_dir.join("gallery.json")),
            similarity_threshold: parse_or(&get, "FACECAST_SIMILARITY_THRESHOLD", 0.40),
            recognize_url: get("FACECAST_RECOGNIZE_URL").unwrap_or_else(|| DEFAULT_RECOGNIZE_URL.to_string()),
            register_url: get("FACECAST_REGISTER_URL").unwrap_or_else(|| DEFAULT_REGISTER_URL.to_string()),
            query_url: get("FACECAST_QUERY_URL").unwrap_or_else(|| DEFAULT_QUERY_URL.to_string()),
            remote_interval: millis_or(&get, "FACECAST_REMOTE_INTERVAL_MS", 1000),
            local_interval: millis_or(&get, "FACECAST_LOCAL_INTERVAL_MS", 100),
            detection_timeout: get("FACECAST_DETECTION_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .filter(|&ms: &u64| ms > 0)
                .map(Duration::from_millis),
            http_timeout: Duration::from_secs(parse_or(&get, "FACECAST_HTTP_TIMEOUT_SECS", 10)),
            surface_path: get("FACECAST_SURFACE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| runtime_dir.join("facecast.jpg")),
            font_path: optional_path("FACECAST_FONT_PATH", PathBuf::from(DEFAULT_FONT)),
        }
    }

    pub fn sampling_interval(&self, mode: DetectionMode) -> Duration {
        match mode {
            DetectionMode::Remote => self.remote_interval,
            DetectionMode::Local => self.local_interval,
        }
    }

    pub fn detection_timeout(&self, mode: DetectionMode) -> Duration {
        self.detection_timeout
            .unwrap_or_else(|| self.sampling_interval(mode))
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "unparseable value, using default");
            default
        }),
        None => default,
    }
}

/// A non-zero duration in milliseconds; zero falls back to `default_ms`.
fn millis_or(get: &impl Fn(&str) -> Option<String>, key: &str, default_ms: u64) -> Duration {
    match parse_or(get, key, default_ms) {
        0 => {
            tracing::warn!(key, default_ms, "interval must be non-zero, using default");
            Duration::from_millis(default_ms)
        }
        ms => Duration::from_millis(ms),
    }
}
