use crate::{post_json, ClientError};
use facecast_hw::{Frame, StillFormat};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Registers a named face with the enrollment service.
pub struct EnrollmentClient {
    client: reqwest::Client,
    url: String,
}

impl EnrollmentClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Send `frame` as a PNG data URL under `name`.
    ///
    /// Returns the service's success message. A blank name is rejected
    /// before the frame is encoded or anything is sent.
    pub async fn register(&self, name: &str, frame: &Frame) -> Result<String, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::InvalidInput("name must not be empty"));
        }

        let image = frame.encode_data_url(StillFormat::Png)?;
        tracing::info!(name, width = frame.width, height = frame.height, "registering face");

        let response: RegisterResponse =
            post_json(&self.client, &self.url, &RegisterRequest { name, image: &image }).await?;
        match response {
            RegisterResponse { error: Some(error), .. } => Err(ClientError::Service(error)),
            RegisterResponse { message: Some(message), .. } => Ok(message),
            _ => Err(ClientError::NoResponse),
        }
    }
}
