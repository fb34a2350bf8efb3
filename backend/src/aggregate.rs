use shared::{Emotion, EmotionResult, EmotionScore};

/// Most frequent label; on a tie the one that appeared first in `labels` wins.
pub fn majority_vote<T: PartialEq + Clone>(labels: &[T]) -> Option<T> {
    let mut counts: Vec<(&T, usize)> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|(seen, _)| *seen == label) {
            Some(entry) => entry.1 += 1,
            None => counts.push((label, 1)),
        }
    }

    let mut best: Option<(&T, usize)> = None;
    for (label, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.clone())
}

/// Sums every label's confidence across `results` and keeps the `n` largest totals.
///
/// Totals keep first-insertion order (results in order, labels in reported order), and the
/// sort is stable, so equal totals rank by first appearance.
pub fn weighted_top(results: &[EmotionResult], n: usize) -> Vec<EmotionScore> {
    let mut totals: Vec<(Emotion, f64)> = Vec::new();
    for result in results {
        for (emotion, score) in result.emotion_details.iter() {
            match totals.iter_mut().find(|(e, _)| *e == emotion) {
                Some(entry) => entry.1 += score,
                None => totals.push((emotion, score)),
            }
        }
    }

    totals.sort_by(|a, b| b.1.total_cmp(&a.1));
    totals
        .into_iter()
        .take(n)
        .map(|(emotion, score)| EmotionScore { emotion, score })
        .collect()
}
