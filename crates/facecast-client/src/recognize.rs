//! Remote recognition: the [`Detector`] backed by the recognition service.

use crate::{post_json, ClientError};
use async_trait::async_trait;
use facecast_core::{AnnotationBatch, DetectionError, Detector, Detection, FaceBox};
use facecast_hw::{Frame, StillFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Option<Vec<FaceRecord>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FaceRecord {
    name: String,
    top: f64,
    right: f64,
    bottom: f64,
    left: f64,
}

impl FaceRecord {
    /// Service coordinates are trusted only as far as the frame extends.
    fn into_detection(self, width: u32, height: u32) -> Detection {
        Detection {
            label: self.name,
            face: FaceBox::from_edges(self.top, self.right, self.bottom, self.left, width, height),
        }
    }
}

/// Sends each frame as a JPEG data URL and maps the returned records 1:1.
pub struct RemoteDetector {
    client: reqwest::Client,
    url: String,
}

impl RemoteDetector {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

}

fn into_batch(frame: &Frame, response: RecognizeResponse) -> AnnotationBatch {
    let sequence = frame.sequence;
    if let Some(error) = response.error {
        tracing::warn!(sequence, error = %error, "recognition service reported an error");
        return AnnotationBatch::empty(sequence);
    }
    let detections = response
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|record| record.into_detection(frame.width, frame.height))
        .collect();
    AnnotationBatch::new(sequence, detections)
}

#[async_trait]
impl Detector for RemoteDetector {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn detect(&self, frame: Arc<Frame>) -> Result<AnnotationBatch, DetectionError> {
        let image = frame
            .encode_data_url(StillFormat::Jpeg)
            .map_err(|e| DetectionError::Unavailable(e.to_string()))?;
        let response: RecognizeResponse = post_json(&self.client, &self.url, &RecognizeRequest { image: &image })
            .await
            .map_err(|e: ClientError| DetectionError::Unavailable(e.to_string()))?;
        Ok(into_batch(&frame, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dead_url, serve};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn detector(base: &str) -> RemoteDetector {
        RemoteDetector::new(reqwest::Client::new(), format!("{base}/recognize"))
    }

    #[tokio::test]
    async fn test_results_map_to_detections() {
        let router = Router::new().route(
            "/recognize",
            post(|Json(body): Json<Value>| async move {
                let image = body["image"].as_str().unwrap_or_default();
                assert!(image.starts_with("data:image/jpeg;base64,"));
                Json(json!({
                    "results": [{"name": "Alice", "top": 10, "right": 120, "bottom": 130, "left": 20}]
                }))
            }),
        );
        let base = serve(router).await;

        let frame = Arc::new(Frame::filled(640, 480, [30, 30, 30], 7));
        let batch = detector(&base).detect(frame).await.unwrap();
        assert_eq!(batch.sequence, 7);
        assert_eq!(
            batch.detections,
            vec![Detection {
                label: "Alice".into(),
                face: FaceBox { top: 10, left: 20, right: 120, bottom: 130 },
            }]
        );
    }

    #[tokio::test]
    async fn test_service_error_yields_no_annotations() {
        let router = Router::new().route(
            "/recognize",
            post(|| async { (axum::http::StatusCode::BAD_REQUEST, Json(json!({"error": "No image provided"}))) }),
        );
        let base = serve(router).await;

        let frame = Arc::new(Frame::filled(32, 32, [0, 0, 0], 3));
        let batch = detector(&base).detect(frame).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.sequence, 3);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_unavailable() {
        let router = Router::new().route("/recognize", post(|| async { "not json" }));
        let base = serve(router).await;

        let frame = Arc::new(Frame::filled(32, 32, [0, 0, 0], 1));
        let err = detector(&base).detect(frame).await.unwrap_err();
        assert!(matches!(err, DetectionError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let base = dead_url().await;
        let frame = Arc::new(Frame::filled(32, 32, [0, 0, 0], 1));
        let err = detector(&base).detect(frame).await.unwrap_err();
        assert!(matches!(err, DetectionError::Unavailable(_)));
    }

    #[test]
    fn test_missing_keys_mean_no_annotations() {
        let response: RecognizeResponse = serde_json::from_str("{}").unwrap();
        assert!(into_batch(&Frame::filled(8, 8, [0, 0, 0], 9), response).is_empty());
    }

    #[test]
    fn test_out_of_range_records_are_clipped() {
        let response: RecognizeResponse = serde_json::from_value(json!({
            "results": [
                {"name": "Bob", "top": -40, "right": 1e12, "bottom": 300, "left": -1e12},
                {"name": "Eve", "top": 50.6, "right": 700, "bottom": 9e9, "left": 600.2}
            ]
        }))
        .unwrap();
        let batch = into_batch(&Frame::filled(640, 480, [0, 0, 0], 2), response);
        let faces: Vec<_> = batch.detections.iter().map(|d| d.face).collect();
        assert_eq!(
            faces,
            [
                FaceBox { top: 0, left: 0, right: 640, bottom: 300 },
                FaceBox { top: 51, left: 600, right: 640, bottom: 480 },
            ]
        );
        assert!(faces.iter().all(|f| f.width() >= 0 && f.height() >= 0));
    }
}
