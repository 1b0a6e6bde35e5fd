//! Verdict engine: threshold one label's confidence.

use crate::classify::Prediction;

/// Derived pass/fail state for the target label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    /// round(probability * 100), 0..=100.
    pub percentage: u8,
    pub pass: bool,
}

impl Verdict {
    /// Meter `aria-valuenow` attribute value.
    pub fn aria_value_now(&self) -> String {
        self.percentage.to_string()
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Probability of `target_label` in `prediction`, 0 when absent.
pub fn target_probability(prediction: &Prediction, target_label: &str) -> f64 {
    let target = normalize_label(target_label);
    prediction
        .scores()
        .iter()
        .find(|score| normalize_label(&score.label) == target)
        .map(|score| score.probability)
        .unwrap_or(0.0)
}

/// Pure: the same inputs always yield the same verdict.
pub fn evaluate(prediction: &Prediction, target_label: &str, threshold: f64) -> Verdict {
    let probability = target_probability(prediction, target_label);
    let percentage = (probability * 100.0).round().clamp(0.0, 100.0) as u8;
    Verdict {
        percentage,
        pass: probability >= threshold,
    }
}
