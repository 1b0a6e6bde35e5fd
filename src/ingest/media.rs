//! Media boundary: devices, constraints, streams and tracks.
//!
//! These types mirror what a platform media layer hands out. Backends
//! (`synthetic`, `v4l2`) implement `MediaDevices`; everything above them only
//! sees the types in this file.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;

use crate::error::{PipelineError, PipelineResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// An enumerated media device. Labels may be empty until permission is granted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl Device {
    pub fn video(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }

    pub fn has_label(&self) -> bool {
        !self.label.trim().is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    /// Toward the user (selfie camera).
    User,
    /// Away from the user.
    Environment,
}

/// Constraint passed to `get_user_media`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoConstraints {
    /// This device or nothing.
    ExactDevice(String),
    /// Any device, preferring the given facing (an "ideal" hint, not required).
    Facing(FacingMode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

/// One track of a stream.
///
/// Clones share ready state: stopping any clone ends the track everywhere, and
/// a backend can end it to signal hardware loss.
#[derive(Clone, Debug)]
pub struct MediaTrack {
    pub id: String,
    pub label: String,
    ended: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ready_state(&self) -> TrackState {
        if self.ended.load(Ordering::Acquire) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    pub fn is_live(&self) -> bool {
        self.ready_state() == TrackState::Live
    }

    pub fn stop(&self) {
        self.ended.store(true, Ordering::Release);
    }
}

/// Produces video frames for a stream.
pub trait VideoSource: Send {
    /// Current frame. `StreamLost` once the hardware is gone.
    fn read_frame(&mut self) -> PipelineResult<RgbaImage>;

    /// Release the underlying device.
    fn close(&mut self) {}
}

/// An acquired stream: its tracks plus the frame source feeding them.
pub struct MediaStream {
    device_id: String,
    tracks: Vec<MediaTrack>,
    source: Box<dyn VideoSource>,
    released: bool,
}

impl MediaStream {
    pub fn new(
        device_id: impl Into<String>,
        tracks: Vec<MediaTrack>,
        source: Box<dyn VideoSource>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            tracks,
            source,
            released: false,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Live as long as every track is live.
    pub fn is_live(&self) -> bool {
        !self.released && self.tracks.iter().all(MediaTrack::is_live)
    }

    pub fn read_frame(&mut self) -> PipelineResult<RgbaImage> {
        if !self.is_live() {
            return Err(PipelineError::StreamLost);
        }
        self.source.read_frame()
    }

    /// Stop every track and release the device. Idempotent.
    pub fn stop(&mut self) {
        for track in &self.tracks {
            track.stop();
        }
        if !self.released {
            self.source.close();
            self.released = true;
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Platform media layer.
pub trait MediaDevices: Send {
    /// Every known device, of every kind, in platform order.
    fn enumerate_devices(&mut self) -> PipelineResult<Vec<Device>>;

    /// Acquire a video stream satisfying `constraints`.
    fn get_user_media(&mut self, constraints: &VideoConstraints) -> PipelineResult<MediaStream>;
}
