use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facecast_client::{http_client, ClientError, EnrollmentClient, RemoteDetector};
use facecast_core::{Detector, FaceDetector, FaceRecognizer, Gallery, Labeling, LocalDetector, UNKNOWN_LABEL};
use facecast_hw::Camera;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod chat;
mod config;
mod enroll;
mod pipeline;
mod preview;
mod sampler;
mod session;

use config::{Config, DetectionMode};
use enroll::Enrollment;
use preview::Preview;

#[derive(Parser)]
#[command(name = "facecast", about = "Live face recognition overlay, enrollment and Q&A")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate the live camera with recognized faces
    Recognize {
        /// Detect in-process instead of calling the recognition service
        #[arg(long)]
        local: bool,
    },
    /// Preview the camera and register your face under a name
    Register {
        /// Name to register
        #[arg(short, long)]
        name: String,
    },
    /// Ask the question-answering service a single question
    Ask {
        question: String,
    },
    /// Interactive question session on stdin
    Chat,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Recognize { local } => recognize(&config, local).await,
        Commands::Register { name } => register(&config, &name).await,
        Commands::Ask { question } => chat::ask_once(&config, &question).await,
        Commands::Chat => chat::run(&config).await,
        Commands::Devices => {
            devices();
            Ok(())
        }
    }
}

async fn recognize(config: &Config, local: bool) -> Result<()> {
    let mode = if local { DetectionMode::Local } else { DetectionMode::Remote };
    let detector: Arc<dyn Detector> = match mode {
        DetectionMode::Remote => {
            let http = http_client(config.detection_timeout(mode)).context("building HTTP client")?;
            Arc::new(RemoteDetector::new(http, &config.recognize_url))
        }
        DetectionMode::Local => {
            let (detector, recognizer) = load_models(config)?;
            let gallery = match (&recognizer, &config.gallery_path) {
                (Some(_), Some(path)) => Some(Gallery::load(path)?),
                _ => None,
            };
            let labeling = match gallery {
                Some(g) if !g.is_empty() => Labeling::Gallery {
                    faces: g.faces().to_vec(),
                    threshold: config.similarity_threshold,
                },
                _ => {
                    tracing::info!("no enrolled faces available locally; boxes will be labeled {UNKNOWN_LABEL}");
                    Labeling::Fixed(UNKNOWN_LABEL.to_string())
                }
            };
            Arc::new(LocalDetector::new(detector, recognizer, labeling))
        }
    };

    let preview = Preview::start(config, mode, detector)?;
    println!("Preview: {} (Ctrl-C to stop)", config.surface_path.display());
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    preview.shutdown().await;
    Ok(())
}

async fn register(config: &Config, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClientError::InvalidInput("name must not be empty").into());
    }

    let (detector, recognizer) = load_models(config)?;
    let has_recognizer = recognizer.is_some();
    let detector = LocalDetector::new(detector, recognizer, Labeling::Fixed(name.to_string()));

    let local = match &config.gallery_path {
        Some(path) if has_recognizer => Some((detector.clone(), Gallery::load(path)?)),
        _ => None,
    };
    let http = http_client(config.http_timeout).context("building HTTP client")?;
    let enrollment = Enrollment::new(EnrollmentClient::new(http, &config.register_url), local);

    enroll::run(config, name, detector, enrollment).await
}

/// Load SCRFD, plus ArcFace when a local gallery is configured.
///
/// A missing detector is fatal; a missing recognizer only disables gallery
/// matching.
fn load_models(config: &Config) -> Result<(FaceDetector, Option<FaceRecognizer>)> {
    let scrfd_path = config.scrfd_model_path();
    let detector = FaceDetector::load(&scrfd_path).with_context(|| format!("loading {scrfd_path}"))?;
    tracing::info!(path = %scrfd_path, "SCRFD detector loaded");

    if config.gallery_path.is_none() {
        return Ok((detector, None));
    }
    let arcface_path = config.arcface_model_path();
    let recognizer = match FaceRecognizer::load(&arcface_path) {
        Ok(r) => {
            tracing::info!(path = %arcface_path, "ArcFace recognizer loaded");
            Some(r)
        }
        Err(e) => {
            tracing::warn!(path = %arcface_path, error = %e, "recognizer unavailable, gallery disabled");
            None
        }
    };
    Ok((detector, recognizer))
}

fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for d in devices {
        println!("{}\t{} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}
