use async_trait::async_trait;
use image::RgbImage;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use super::{AnalyzeOptions, ClassificationError, EmotionModel, FaceAnalysis, ModelOutput, RawScore};
use crate::decode::encode_png;

/// Client for an image-classification inference endpoint answering `[{label, score}, ...]`,
/// best label first.
#[derive(Clone)]
pub struct ClassifierClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct LabelScore {
    label: String,
    score: RawScore,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassifierResponse {
    Labels(Vec<LabelScore>),
    Failure { error: String },
}

impl ClassifierClient {
    pub fn new(client: reqwest::Client, url: &str, token: Option<String>) -> Self {
        Self {
            client,
            url: url.to_string(),
            token,
        }
    }
}

#[async_trait]
impl EmotionModel for ClassifierClient {
    fn name(&self) -> &str {
        "classifier"
    }

    // No face detection stage here, so `enforce_detection` has nothing to act on.
    async fn analyze(
        &self,
        image: &RgbImage,
        _options: &AnalyzeOptions,
    ) -> Result<ModelOutput, ClassificationError> {
        let png = encode_png(image)
            .map_err(|e| ClassificationError::Backend(format!("Failed to encode image: {}", e)))?;

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "image/png")
            .body(png);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        log::debug!("Classifier answered {} ({} bytes)", status, body.len());
        parse_response(status, &body)
    }
}

fn parse_response(status: StatusCode, body: &str) -> Result<ModelOutput, ClassificationError> {
    let parsed = serde_json::from_str::<ClassifierResponse>(body);
    match parsed {
        Ok(ClassifierResponse::Failure { error }) => Err(ClassificationError::Backend(error)),
        Ok(ClassifierResponse::Labels(_)) | Err(_) if !status.is_success() => Err(
            ClassificationError::Backend(format!("Classifier returned {}: {}", status, body.trim())),
        ),
        Ok(ClassifierResponse::Labels(labels)) => {
            let dominant_emotion = labels.first().map(|l| l.label.clone());
            Ok(ModelOutput::Single(FaceAnalysis {
                dominant_emotion,
                emotion: labels.into_iter().map(|l| (l.label, l.score)).collect(),
            }))
        }
        Err(e) => Err(ClassificationError::InvalidOutput(e.to_string())),
    }
}
