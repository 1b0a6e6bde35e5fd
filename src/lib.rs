//! Live verdict classifier loop
//!
//! Streams a camera (or a single still image) into a fixed-size raster
//! buffer, classifies every frame with an image classifier and reduces the
//! result to a pass/fail verdict for one target label.
//!
//! # Pipeline
//!
//! 1. **Device selection**: prefer a user-facing camera, unlocking labels
//!    with a throwaway stream when the platform hides them.
//! 2. **Capture**: one live stream at a time, frames stretched over the
//!    buffer and mirrored for a selfie view.
//! 3. **Stills**: uploaded images are letterboxed, never mirrored.
//! 4. **Classification**: a background-loaded backend scores the buffer.
//! 5. **Verdict**: the target label's probability against a threshold.
//! 6. **Render loop**: runs only while the camera is Active.
//!
//! # Module Structure
//!
//! - `camera`: camera lifecycle state machine and shared controller
//! - `classify`: classifier backends, slot and predictions
//! - `frame`: raster buffer and the read-only inference view
//! - `ingest`: media devices, selector, capture pipeline, still images
//! - `session`: the per-page context tying the pieces together
//! - `scheduler`: the paced render loop
//! - `ui`: verdict surfaces (terminal, in-memory)

pub mod camera;
pub mod classify;
pub mod config;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod scheduler;
pub mod session;
pub mod ui;
pub mod verdict;

pub use camera::{Affordances, CameraController, CameraEvent, CameraState};
pub use classify::{
    ClassScore, ClassifierBackend, ClassifierSlot, LoadStatus, Prediction, StubClassifier,
};
#[cfg(feature = "backend-tract")]
pub use classify::{ModelMetadata, TractClassifier};
pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult};
pub use frame::{InferenceView, Placement, RasterBuffer};
pub use ingest::{
    letterbox, list_video_inputs, pick_front, CapturePipeline, Device, MediaDevices, MediaStream,
    SyntheticMedia,
};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Media};
pub use scheduler::{run, FramePacer, IntervalPacer, LoopStats};
pub use session::{CycleOutcome, Session};
pub use ui::{MemorySurface, TerminalSurface, UiMode, VerdictSurface};
pub use verdict::{evaluate, Verdict};
