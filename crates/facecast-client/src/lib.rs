//! facecast-client: HTTP clients for the recognition, enrollment and
//! question-answering services.
//!
//! Images travel as data URLs in a JSON body. The services answer with a
//! JSON object whose keys select the outcome; a missing key is never an
//! error on its own.

pub mod enroll;
pub mod query;
pub mod recognize;

#[cfg(test)]
mod testing;

pub use enroll::EnrollmentClient;
pub use query::{ChatLog, ChatMessage, QueryClient, Reply, Speaker};
pub use recognize::RemoteDetector;

use facecast_hw::FrameError;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RECOGNIZE_URL: &str = "http://localhost:5000/recognize";
pub const DEFAULT_REGISTER_URL: &str = "http://localhost:5001/register";
pub const DEFAULT_QUERY_URL: &str = "http://localhost:5002/query";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Failure reported by the service itself, verbatim.
    #[error("{0}")]
    Service(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("frame encoding: {0}")]
    Encode(#[from] FrameError),
    #[error("no response received")]
    NoResponse,
}

/// HTTP client shared by all service clients.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// POST `body` as JSON to `url` and decode the JSON reply.
///
/// Non-2xx statuses are still decoded: the services report failures in the
/// body alongside a 4xx/5xx status.
pub(crate) async fn post_json<B, R>(client: &reqwest::Client, url: &str, body: &B) -> Result<R, ClientError>
where
    B: serde::Serialize + ?Sized,
    R: serde::de::DeserializeOwned,
{
    let transport = |source| ClientError::Transport {
        url: url.to_string(),
        source,
    };
    let response = client.post(url).json(body).send().await.map_err(transport)?;
    tracing::debug!(url, status = %response.status(), "service replied");
    response.json::<R>().await.map_err(transport)
}
