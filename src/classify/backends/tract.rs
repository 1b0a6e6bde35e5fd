#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::Deserialize;
use tract_onnx::prelude::*;

use crate::classify::backend::ClassifierBackend;
use crate::classify::prediction::ClassScore;

const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Image-model metadata exported next to the weights.
///
/// Only the fields we need; exporters add more (package versions, user
/// metadata) which are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub labels: Vec<String>,
    #[serde(default)]
    pub image_size: Option<u32>,
}

impl ModelMetadata {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model metadata {}", path.display()))?;
        let metadata: ModelMetadata = serde_json::from_str(&raw)
            .with_context(|| format!("invalid model metadata {}", path.display()))?;
        if metadata.labels.is_empty() {
            return Err(anyhow!("model metadata {} lists no labels", path.display()));
        }
        Ok(metadata)
    }
}

/// Tract-based backend for ONNX image classifiers.
///
/// Input is a single NHWC RGB image normalized to [-1, 1]; output is one score
/// per label in metadata order.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: Vec<String>,
    image_size: u32,
}

impl TractClassifier {
    /// Load an ONNX model and its metadata from disk.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(model_path: P, metadata_path: Q) -> Result<Self> {
        let model_path = model_path.as_ref();
        let metadata = ModelMetadata::from_path(metadata_path.as_ref())?;
        let image_size = metadata.image_size.unwrap_or(DEFAULT_IMAGE_SIZE);
        let side = image_size as usize;

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, side, side, 3)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractClassifier: loaded {} ({} labels, {}x{} input)",
            model_path.display(),
            metadata.labels.len(),
            image_size,
            image_size
        );

        Ok(Self {
            model,
            labels: metadata.labels,
            image_size,
        })
    }

    fn build_input(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        flip_horizontal: bool,
    ) -> Result<Tensor> {
        let frame = RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
            anyhow!(
                "expected {}x{} RGBA bytes, received {}",
                width,
                height,
                pixels.len()
            )
        })?;
        let mut frame = if frame.dimensions() == (self.image_size, self.image_size) {
            frame
        } else {
            imageops::resize(&frame, self.image_size, self.image_size, FilterType::Triangle)
        };
        if flip_horizontal {
            imageops::flip_horizontal_in_place(&mut frame);
        }

        let side = self.image_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
            let px = frame.get_pixel(x as u32, y as u32);
            px[c] as f32 / 127.5 - 1.0
        });
        Ok(input.into_tensor())
    }

    fn extract_scores(&self, outputs: TVec<TValue>) -> Result<Vec<f64>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let raw: Vec<f64> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .map(|v| *v as f64)
            .collect();
        if raw.len() != self.labels.len() {
            return Err(anyhow!(
                "model produced {} scores for {} labels",
                raw.len(),
                self.labels.len()
            ));
        }
        Ok(normalize_scores(raw))
    }
}

/// Apply softmax unless the scores already look like probabilities.
pub(crate) fn normalize_scores(raw: Vec<f64>) -> Vec<f64> {
    let sum: f64 = raw.iter().sum();
    let looks_normalized = raw.iter().all(|v| (0.0..=1.0).contains(v)) && (sum - 1.0).abs() < 1e-3;
    if looks_normalized {
        return raw;
    }
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = raw.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|v| v / total).collect()
}

impl ClassifierBackend for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        flip_horizontal: bool,
    ) -> Result<Vec<ClassScore>> {
        let input = self.build_input(pixels, width, height, flip_horizontal)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let scores = self.extract_scores(outputs)?;
        Ok(self
            .labels
            .iter()
            .zip(scores)
            .map(|(label, probability)| ClassScore::new(label.clone(), probability))
            .collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.image_size;
        let blank = vec![0u8; (side * side * 4) as usize];
        self.predict(&blank, side, side, false).map(|_| ())
    }
}
