//! Error taxonomy for the acquisition-and-inference loop.
//!
//! Every variant is recoverable: the session returns to `Idle` and the user may
//! retry. Only `ClassifierUnavailable` has special handling inside the render
//! loop, where it skips a single frame.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Enumeration produced zero video inputs.
    #[error("no video input device found")]
    NoDeviceFound,

    /// Permission denied, or neither the exact-device nor the facing-mode
    /// constraint could be satisfied.
    #[error("camera unavailable: {reason}")]
    CameraUnavailable { reason: String },

    /// The classifier has not finished loading.
    #[error("classifier is not loaded yet")]
    ClassifierUnavailable,

    /// The background model load gave up. Frames keep being skipped.
    #[error("failed to load model: {reason}")]
    ModelLoadFailed { reason: String },

    /// The stream's tracks were ended outside our control (device unplugged).
    #[error("camera stream lost")]
    StreamLost,

    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn camera_unavailable(reason: impl Into<String>) -> Self {
        Self::CameraUnavailable {
            reason: reason.into(),
        }
    }

    /// True for the errors raised while acquiring a camera.
    pub fn is_acquisition_error(&self) -> bool {
        matches!(
            self,
            Self::NoDeviceFound | Self::CameraUnavailable { .. }
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
