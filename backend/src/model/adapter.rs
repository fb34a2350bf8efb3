use std::str::FromStr;
use std::sync::Arc;

use image::RgbImage;
use shared::{Emotion, EmotionResult, EmotionScores};

use super::{AnalyzeOptions, ClassificationError, EmotionModel, FaceAnalysis, ModelOutput};

/// Binds a backend to the detection policy of one route.
#[derive(Clone)]
pub struct ModelAdapter {
    model: Arc<dyn EmotionModel>,
    options: AnalyzeOptions,
}

impl ModelAdapter {
    pub fn new(model: Arc<dyn EmotionModel>, options: AnalyzeOptions) -> Self {
        Self { model, options }
    }

    pub fn backend_name(&self) -> &str {
        self.model.name()
    }

    pub fn options(&self) -> AnalyzeOptions {
        self.options
    }

    pub async fn classify(&self, image: &RgbImage) -> Result<EmotionResult, ClassificationError> {
        let output = self.model.analyze(image, &self.options).await?;
        normalize(output)
    }
}

/// Reduces any backend output to one canonical result. Multi-face outputs keep the first face.
pub fn normalize(output: ModelOutput) -> Result<EmotionResult, ClassificationError> {
    let face = match output {
        ModelOutput::Single(face) => face,
        ModelOutput::Many(faces) => faces
            .into_iter()
            .next()
            .ok_or(ClassificationError::NoResult)?,
    };
    normalize_face(face)
}

fn normalize_face(face: FaceAnalysis) -> Result<EmotionResult, ClassificationError> {
    let mut details = EmotionScores::new();
    for (label, score) in &face.emotion {
        details.insert(parse_label(label)?, score.to_f64()?);
    }

    let dominant_emotion = match face.dominant_emotion.as_deref() {
        Some(label) => parse_label(label)?,
        None => details.first().ok_or(ClassificationError::NoResult)?,
    };
    if details.is_empty() {
        return Err(ClassificationError::NoResult);
    }

    Ok(EmotionResult {
        dominant_emotion,
        emotion_details: details,
    })
}

fn parse_label(label: &str) -> Result<Emotion, ClassificationError> {
    Emotion::from_str(label.trim())
        .map_err(|_| ClassificationError::InvalidOutput(format!("unknown emotion label '{}'", label)))
}
