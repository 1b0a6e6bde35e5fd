//! Frame acquisition.
//!
//! This module provides both input sources for the raster buffer:
//! - live cameras through the `MediaDevices` boundary (synthetic `stub://`
//!   devices, or V4L2 nodes with feature `ingest-v4l2`)
//! - uploaded still images (`still`)
//!
//! The device selector picks which camera to open, the capture pipeline owns
//! the one live stream. Live frames fill the buffer (optionally mirrored);
//! stills are letterboxed and never mirrored.

pub mod capture;
pub mod media;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod selector;
pub mod still;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use capture::{CapturePipeline, CaptureStats};
pub use media::{
    Device, DeviceKind, FacingMode, MediaDevices, MediaStream, MediaTrack, TrackState,
    VideoConstraints, VideoSource,
};
pub use selector::{list_video_inputs, pick_front};
pub use still::{composite_image, decode_image, letterbox, read_image};
pub use synthetic::{SyntheticMedia, TrackLog};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Media};
