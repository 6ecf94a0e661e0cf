//! Registration: preview with boxes labeled by the name being enrolled,
//! capture the current frame on Enter.

use crate::config::{Config, DetectionMode};
use crate::preview::Preview;
use anyhow::{Context, Result};
use facecast_client::{ClientError, EnrollmentClient};
use facecast_core::{Gallery, LocalDetector};
use facecast_hw::VideoElement;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Sends captures to the enrollment service and mirrors successful ones
/// into the local gallery when one is configured.
pub struct Enrollment {
    client: EnrollmentClient,
    local: Option<(LocalDetector, Gallery)>,
}

impl Enrollment {
    pub fn new(client: EnrollmentClient, local: Option<(LocalDetector, Gallery)>) -> Self {
        Self { client, local }
    }

    /// Register the frame currently shown by `video` under `name`.
    pub async fn capture(&mut self, name: &str, video: &VideoElement) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::InvalidInput("name must not be empty").into());
        }
        let frame = video.current_frame().context("camera has not produced a frame yet")?;

        let message = self.client.register(name, &frame).await?;

        if let Some((detector, gallery)) = &mut self.local {
            match detector.embed_largest_face(frame).await {
                Ok(Some(embedding)) => {
                    gallery.enroll(name, embedding)?;
                }
                Ok(None) => tracing::warn!(name, "no face found locally, gallery unchanged"),
                Err(e) => tracing::warn!(name, error = %e, "local embedding failed, gallery unchanged"),
            }
        }
        Ok(message)
    }
}

pub async fn run(config: &Config, name: &str, detector: LocalDetector, mut enrollment: Enrollment) -> Result<()> {
    let preview = Preview::start(config, DetectionMode::Local, Arc::new(detector))?;
    let mut ready = preview.camera_ready();
    let mut announced = false;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Preview: {}", config.surface_path.display());
    loop {
        tokio::select! {
            changed = ready.changed(), if !announced => {
                if changed.is_err() || *ready.borrow() {
                    announced = true;
                    println!("Camera ready. Press Enter to register {name}, q then Enter to quit.");
                }
            }
            line = lines.next_line() => {
                match line.context("reading stdin")? {
                    None => break,
                    Some(l) if l.trim().eq_ignore_ascii_case("q") => break,
                    Some(_) => match enrollment.capture(name, preview.video()).await {
                        Ok(message) => println!("{message}"),
                        Err(e) => println!("Registration failed: {e:#}"),
                    },
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    preview.shutdown().await;
    Ok(())
}
