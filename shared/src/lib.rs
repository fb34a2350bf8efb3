use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{Display, EnumString};

/// Labels produced by the facial expression models.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

/// Confidence per label, in the order the model reported them.
///
/// Serialized as a JSON object; the order of keys is preserved both ways.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmotionScores(Vec<(Emotion, f64)>);

impl EmotionScores {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets the score of `emotion`, keeping its original position if already present.
    pub fn insert(&mut self, emotion: Emotion, score: f64) {
        match self.0.iter_mut().find(|(e, _)| *e == emotion) {
            Some(entry) => entry.1 = score,
            None => self.0.push((emotion, score)),
        }
    }

    pub fn get(&self, emotion: Emotion) -> Option<f64> {
        self.0.iter().find(|(e, _)| *e == emotion).map(|(_, s)| *s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        self.0.iter().copied()
    }

    pub fn first(&self) -> Option<Emotion> {
        self.0.first().map(|(e, _)| *e)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Emotion, f64)> for EmotionScores {
    fn from_iter<I: IntoIterator<Item = (Emotion, f64)>>(iter: I) -> Self {
        let mut scores = EmotionScores::new();
        for (emotion, score) in iter {
            scores.insert(emotion, score);
        }
        scores
    }
}

impl Serialize for EmotionScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (emotion, score) in &self.0 {
            map.serialize_entry(emotion, score)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EmotionScores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScoresVisitor;

        impl<'de> Visitor<'de> for ScoresVisitor {
            type Value = EmotionScores;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of emotion labels to scores")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut scores = EmotionScores::new();
                while let Some((emotion, score)) = access.next_entry::<Emotion, f64>()? {
                    scores.insert(emotion, score);
                }
                Ok(scores)
            }
        }

        deserializer.deserialize_map(ScoresVisitor)
    }
}

/// One websocket message from the camera client.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FrameRequest {
    #[serde(default)]
    pub frame: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmotionResult {
    pub dominant_emotion: Emotion,
    pub emotion_details: EmotionScores,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmotionScore {
    pub emotion: Emotion,
    pub score: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MajorityResponse {
    pub majority_emotion: Emotion,
    pub predictions: Vec<Emotion>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WeightedResponse {
    pub results: Vec<EmotionResult>,
    pub global_top_emotions: Vec<EmotionScore>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
