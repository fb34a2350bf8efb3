use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;
use reqwest::StatusCode;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::{AnalyzeOptions, ClassificationError, EmotionModel, FaceAnalysis, ModelOutput, RawScore};
use crate::decode::encode_png;

/// Client for a DeepFace REST service (`POST /analyze`).
#[derive(Clone)]
pub struct DeepFaceClient {
    client: reqwest::Client,
    analyze_url: String,
    detector_backend: String,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    img: String,
    actions: [&'a str; 1],
    enforce_detection: bool,
    detector_backend: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    results: Option<Results>,
    error: Option<String>,
    exception: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Results {
    Many(Vec<FaceEntry>),
    Single(FaceEntry),
}

#[derive(Deserialize)]
struct FaceEntry {
    dominant_emotion: Option<String>,
    #[serde(default, deserialize_with = "ordered_scores")]
    emotion: Vec<(String, RawScore)>,
}

impl From<FaceEntry> for FaceAnalysis {
    fn from(entry: FaceEntry) -> Self {
        FaceAnalysis {
            dominant_emotion: entry.dominant_emotion,
            emotion: entry.emotion,
        }
    }
}

impl DeepFaceClient {
    pub fn new(client: reqwest::Client, base_url: &str, detector_backend: &str) -> Self {
        Self {
            client,
            analyze_url: format!("{}/analyze", base_url.trim_end_matches('/')),
            detector_backend: detector_backend.to_string(),
        }
    }
}

#[async_trait]
impl EmotionModel for DeepFaceClient {
    fn name(&self) -> &str {
        "deepface"
    }

    async fn analyze(
        &self,
        image: &RgbImage,
        options: &AnalyzeOptions,
    ) -> Result<ModelOutput, ClassificationError> {
        let png = encode_png(image)
            .map_err(|e| ClassificationError::Backend(format!("Failed to encode image: {}", e)))?;
        let request = AnalyzeRequest {
            img: format!("data:image/png;base64,{}", STANDARD.encode(png)),
            actions: ["emotion"],
            enforce_detection: options.enforce_detection,
            detector_backend: &self.detector_backend,
        };

        let response = self
            .client
            .post(&self.analyze_url)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        log::debug!("DeepFace answered {} ({} bytes)", status, body.len());
        parse_response(status, &body)
    }
}

fn parse_response(status: StatusCode, body: &str) -> Result<ModelOutput, ClassificationError> {
    let parsed: Result<AnalyzeResponse, _> = serde_json::from_str(body);

    if !status.is_success() {
        let message = parsed
            .ok()
            .and_then(|r| r.error.or(r.exception))
            .unwrap_or_else(|| format!("DeepFace service returned {}: {}", status, body.trim()));
        return Err(ClassificationError::Backend(message));
    }

    let parsed = parsed.map_err(|e| ClassificationError::InvalidOutput(e.to_string()))?;
    match (parsed.results, parsed.error.or(parsed.exception)) {
        (_, Some(message)) => Err(ClassificationError::Backend(message)),
        (Some(Results::Single(face)), None) => Ok(ModelOutput::Single(face.into())),
        (Some(Results::Many(faces)), None) => Ok(ModelOutput::Many(
            faces.into_iter().map(FaceAnalysis::from).collect(),
        )),
        (None, None) => Err(ClassificationError::NoResult),
    }
}

/// Reads a JSON object into pairs without losing key order.
fn ordered_scores<'de, D>(deserializer: D) -> Result<Vec<(String, RawScore)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, RawScore)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of emotion scores")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(7));
            while let Some(pair) = access.next_entry::<String, RawScore>()? {
                pairs.push(pair);
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairsVisitor)
}
