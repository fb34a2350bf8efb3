use serde_json::json;
use shared::{EmotionResult, MajorityResponse, WeightedResponse};

use crate::aggregate::{majority_vote, weighted_top};

pub const GLOBAL_TOP: usize = 3;

/// Text of the websocket reply for one frame.
pub fn frame_reply<E: std::fmt::Display>(outcome: &Result<EmotionResult, E>) -> String {
    match outcome {
        Ok(result) => serde_json::to_string(result)
            .unwrap_or_else(|e| error_body(&e.to_string())),
        Err(e) => error_body(&e.to_string()),
    }
}

pub fn error_body(message: &str) -> String {
    json!({ "error": message }).to_string()
}

pub fn majority_response(results: &[EmotionResult]) -> Option<MajorityResponse> {
    let predictions: Vec<_> = results.iter().map(|r| r.dominant_emotion).collect();
    let majority_emotion = majority_vote(&predictions)?;
    Some(MajorityResponse {
        majority_emotion,
        predictions,
    })
}

pub fn weighted_response(results: Vec<EmotionResult>) -> WeightedResponse {
    let global_top_emotions = weighted_top(&results, GLOBAL_TOP);
    WeightedResponse {
        results,
        global_top_emotions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shared::{Emotion, EmotionScores};

    fn result(dominant: Emotion, scores: &[(Emotion, f64)]) -> EmotionResult {
        EmotionResult {
            dominant_emotion: dominant,
            emotion_details: scores.iter().copied().collect::<EmotionScores>(),
        }
    }

    #[test]
    fn frame_success_shape() {
        let ok: Result<_, String> = Ok(result(
            Emotion::Happy,
            &[(Emotion::Happy, 91.5), (Emotion::Sad, 8.5)],
        ));
        let body: Value = serde_json::from_str(&frame_reply(&ok)).unwrap();
        assert_eq!(body["dominant_emotion"], "happy");
        assert_eq!(body["emotion_details"]["sad"], 8.5);
        assert!(body.get("error").is_none());
    }

    #[test]
    fn frame_error_shape() {
        let err: Result<EmotionResult, _> = Err("Invalid base64 payload");
        let body: Value = serde_json::from_str(&frame_reply(&err)).unwrap();
        assert_eq!(body, json!({"error": "Invalid base64 payload"}));
    }

    #[test]
    fn majority_lists_every_prediction() {
        let results = vec![
            result(Emotion::Sad, &[(Emotion::Sad, 0.9)]),
            result(Emotion::Angry, &[(Emotion::Angry, 0.9)]),
            result(Emotion::Angry, &[(Emotion::Angry, 0.6)]),
        ];
        let response = majority_response(&results).unwrap();
        assert_eq!(response.majority_emotion, Emotion::Angry);
        assert_eq!(
            response.predictions,
            vec![Emotion::Sad, Emotion::Angry, Emotion::Angry]
        );
        assert!(majority_response(&[]).is_none());
    }

    #[test]
    fn weighted_keeps_per_image_results() {
        let results = vec![
            result(Emotion::Happy, &[(Emotion::Happy, 0.9), (Emotion::Sad, 0.1)]),
            result(Emotion::Neutral, &[(Emotion::Happy, 0.2), (Emotion::Neutral, 0.8)]),
            result(Emotion::Sad, &[(Emotion::Sad, 0.5), (Emotion::Neutral, 0.5)]),
        ];
        let response = weighted_response(results.clone());
        assert_eq!(response.results, results);
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["global_top_emotions"][0]["emotion"], "neutral");
        assert_eq!(body["global_top_emotions"].as_array().unwrap().len(), 3);
    }
}
