pub mod adapter;
pub mod deepface;
pub mod pipeline;
#[cfg(feature = "torch")]
pub mod torch;

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;

pub use adapter::ModelAdapter;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassificationError {
    #[error("{0}")]
    Backend(String),
    #[error("Model backend unreachable: {0}")]
    Transport(String),
    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),
    #[error("Model returned no result")]
    NoResult,
}

impl From<reqwest::Error> for ClassificationError {
    fn from(err: reqwest::Error) -> Self {
        ClassificationError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalyzeOptions {
    /// Fail instead of guessing when no face is found.
    pub enforce_detection: bool,
}

/// A confidence value as the backend reported it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawScore {
    Number(f64),
    Text(String),
}

impl RawScore {
    pub fn to_f64(&self) -> Result<f64, ClassificationError> {
        let value = match self {
            RawScore::Number(v) => *v,
            RawScore::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                ClassificationError::InvalidOutput(format!("score '{}' is not a number", s))
            })?,
        };
        if !value.is_finite() || value < 0.0 {
            return Err(ClassificationError::InvalidOutput(format!(
                "score {} is out of range",
                value
            )));
        }
        Ok(value)
    }
}

impl From<f32> for RawScore {
    fn from(value: f32) -> Self {
        RawScore::Number(f64::from(value))
    }
}

/// Emotion analysis of one face, before label validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceAnalysis {
    pub dominant_emotion: Option<String>,
    pub emotion: Vec<(String, RawScore)>,
}

/// Backends answer with one analysis or one per detected face.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Single(FaceAnalysis),
    Many(Vec<FaceAnalysis>),
}

#[async_trait]
pub trait EmotionModel: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        image: &RgbImage,
        options: &AnalyzeOptions,
    ) -> Result<ModelOutput, ClassificationError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays queued outputs, then repeats the fallback.
    pub struct ScriptedModel {
        queue: Mutex<VecDeque<Result<ModelOutput, ClassificationError>>>,
        fallback: Result<ModelOutput, ClassificationError>,
        calls: AtomicUsize,
        options: Mutex<Vec<AnalyzeOptions>>,
    }

    impl ScriptedModel {
        pub fn always(output: Result<ModelOutput, ClassificationError>) -> Self {
            Self::scripted(Vec::new(), output)
        }

        pub fn scripted(
            outputs: Vec<Result<ModelOutput, ClassificationError>>,
            fallback: Result<ModelOutput, ClassificationError>,
        ) -> Self {
            Self {
                queue: Mutex::new(outputs.into()),
                fallback,
                calls: AtomicUsize::new(0),
                options: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn seen_options(&self) -> Vec<AnalyzeOptions> {
            self.options.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmotionModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn analyze(
            &self,
            _image: &RgbImage,
            options: &AnalyzeOptions,
        ) -> Result<ModelOutput, ClassificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.options.lock().unwrap().push(*options);
            let next = self.queue.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    pub fn face(scores: &[(&str, f64)]) -> FaceAnalysis {
        FaceAnalysis {
            dominant_emotion: None,
            emotion: scores
                .iter()
                .map(|(label, score)| (label.to_string(), RawScore::Number(*score)))
                .collect(),
        }
    }
}
