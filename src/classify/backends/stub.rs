use anyhow::{anyhow, Result};

use crate::classify::backend::ClassifierBackend;
use crate::classify::prediction::ClassScore;

/// Stub backend for demos and tests.
///
/// Two classes: the first label scores the mean luminance of the frame, the
/// second scores its complement. Deterministic for a given frame.
pub struct StubClassifier {
    labels: Vec<String>,
}

impl StubClassifier {
    pub fn new(bright_label: impl Into<String>, dark_label: impl Into<String>) -> Self {
        Self {
            labels: vec![bright_label.into(), dark_label.into()],
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new("STEM Teacher", "Other")
    }
}

fn mean_luminance(pixels: &[u8], width: u32, height: u32) -> Result<f64> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "expected {} RGBA bytes, received {}",
            expected,
            pixels.len()
        ));
    }
    if expected == 0 {
        return Ok(0.0);
    }
    let total: f64 = pixels
        .chunks_exact(4)
        .map(|px| 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64)
        .sum();
    Ok(total / (expected / 4) as f64 / 255.0)
}

impl ClassifierBackend for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        _flip_horizontal: bool,
    ) -> Result<Vec<ClassScore>> {
        // a global mean is orientation-independent
        let bright = mean_luminance(pixels, width, height)?.clamp(0.0, 1.0);
        Ok(vec![
            ClassScore::new(self.labels[0].clone(), bright),
            ClassScore::new(self.labels[1].clone(), 1.0 - bright),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_frame_scores_first_label() {
        let mut backend = StubClassifier::default();
        let pixels = vec![255u8; 2 * 2 * 4];

        let scores = backend.predict(&pixels, 2, 2, false).unwrap();
        assert_eq!(scores[0].label, "STEM Teacher");
        assert!((scores[0].probability - 1.0).abs() < 1e-9);
        assert!(scores[1].probability.abs() < 1e-9);
    }

    #[test]
    fn rejects_wrong_length() {
        let mut backend = StubClassifier::default();
        assert!(backend.predict(&[0u8; 7], 2, 2, false).is_err());
    }
}
