//! Synthetic media backend (`stub://` devices) for tests and demos.
//!
//! Behaves like a platform media layer with knobs for the awkward cases:
//! hidden labels before permission, denied permission, busy devices and
//! hardware that disappears mid-stream. Every issued track is recorded in a
//! `TrackLog` so callers can verify release after handing the backend away.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};

use super::media::{
    Device, DeviceKind, FacingMode, MediaDevices, MediaStream, MediaTrack, VideoConstraints,
    VideoSource,
};
use super::selector::is_front_label;
use crate::error::{PipelineError, PipelineResult};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

/// Shared record of every track the backend handed out.
#[derive(Clone, Debug, Default)]
pub struct TrackLog {
    tracks: Arc<Mutex<Vec<MediaTrack>>>,
}

impl TrackLog {
    fn record(&self, track: MediaTrack) {
        match self.tracks.lock() {
            Ok(mut tracks) => tracks.push(track),
            Err(poisoned) => poisoned.into_inner().push(track),
        }
    }

    pub fn issued(&self) -> Vec<MediaTrack> {
        match self.tracks.lock() {
            Ok(tracks) => tracks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.issued().iter().filter(|t| t.is_live()).count()
    }

    /// End every live track, as if the hardware was unplugged.
    pub fn unplug_all(&self) {
        for track in self.issued() {
            track.stop();
        }
    }
}

pub struct SyntheticMedia {
    devices: Vec<Device>,
    hide_labels: bool,
    labels_unlocked: bool,
    permission_denied: bool,
    busy: HashSet<String>,
    frame_size: (u32, u32),
    unplug_after: Option<u64>,
    streams_opened: u64,
    log: TrackLog,
}

impl SyntheticMedia {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            hide_labels: false,
            labels_unlocked: false,
            permission_denied: false,
            busy: HashSet::new(),
            frame_size: (DEFAULT_WIDTH, DEFAULT_HEIGHT),
            unplug_after: None,
            streams_opened: 0,
            log: TrackLog::default(),
        }
    }

    /// A phone-like pair: back camera first, front camera second.
    pub fn phone() -> Self {
        Self::new(vec![
            Device::video("stub://back", "Back Camera"),
            Device::video("stub://front", "Front Camera"),
        ])
    }

    /// Report empty labels until a stream has been granted once.
    pub fn with_hidden_labels(mut self) -> Self {
        self.hide_labels = true;
        self
    }

    pub fn deny_permission(mut self) -> Self {
        self.permission_denied = true;
        self
    }

    pub fn with_busy_device(mut self, id: &str) -> Self {
        self.busy.insert(id.to_string());
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    /// End each stream's tracks after it has produced `frames` frames.
    pub fn unplug_after(mut self, frames: u64) -> Self {
        self.unplug_after = Some(frames);
        self
    }

    pub fn track_log(&self) -> TrackLog {
        self.log.clone()
    }

    fn usable(&self, device: &Device) -> bool {
        device.kind == DeviceKind::VideoInput && !self.busy.contains(&device.id)
    }

    fn resolve(&self, constraints: &VideoConstraints) -> PipelineResult<Device> {
        match constraints {
            VideoConstraints::ExactDevice(id) => {
                let device = self
                    .devices
                    .iter()
                    .find(|d| &d.id == id)
                    .ok_or_else(|| PipelineError::camera_unavailable(format!("unknown device {}", id)))?;
                if !self.usable(device) {
                    return Err(PipelineError::camera_unavailable(format!(
                        "device {} is busy",
                        id
                    )));
                }
                Ok(device.clone())
            }
            VideoConstraints::Facing(mode) => {
                let candidates: Vec<&Device> =
                    self.devices.iter().filter(|d| self.usable(d)).collect();
                let wants_front = *mode == FacingMode::User;
                candidates
                    .iter()
                    .find(|d| is_front_label(&d.label) == wants_front)
                    .or_else(|| candidates.first())
                    .map(|d| (*d).clone())
                    .ok_or_else(|| {
                        PipelineError::camera_unavailable("no camera satisfies facing mode")
                    })
            }
        }
    }
}

impl MediaDevices for SyntheticMedia {
    fn enumerate_devices(&mut self) -> PipelineResult<Vec<Device>> {
        let hide = self.hide_labels && !self.labels_unlocked;
        Ok(self
            .devices
            .iter()
            .map(|d| Device {
                label: if hide { String::new() } else { d.label.clone() },
                ..d.clone()
            })
            .collect())
    }

    fn get_user_media(&mut self, constraints: &VideoConstraints) -> PipelineResult<MediaStream> {
        if self.permission_denied {
            return Err(PipelineError::camera_unavailable("permission denied"));
        }
        let device = self.resolve(constraints)?;

        self.streams_opened += 1;
        self.labels_unlocked = true;
        let track = MediaTrack::new(format!("track-{}", self.streams_opened), device.label.clone());
        self.log.record(track.clone());

        log::info!("SyntheticMedia: opened {} (synthetic)", device.id);
        let source = SyntheticVideoSource {
            width: self.frame_size.0,
            height: self.frame_size.1,
            frame_count: 0,
            unplug_after: self.unplug_after,
            track: track.clone(),
        };
        Ok(MediaStream::new(device.id, vec![track], Box::new(source)))
    }
}

struct SyntheticVideoSource {
    width: u32,
    height: u32,
    frame_count: u64,
    unplug_after: Option<u64>,
    track: MediaTrack,
}

impl SyntheticVideoSource {
    /// Horizontal gradient whose overall brightness sweeps up and down over
    /// roughly 250 frames.
    fn generate(&self) -> RgbaImage {
        let phase = (self.frame_count * 2) % 512;
        let level = (if phase > 255 { 511 - phase } else { phase }) as u32;
        let width = self.width.max(1);
        RgbaImage::from_fn(self.width, self.height, |x, _| {
            let ramp = x * 32 / width;
            let v = (level + ramp).min(255) as u8;
            Rgba([v, v, v, 255])
        })
    }
}

impl VideoSource for SyntheticVideoSource {
    fn read_frame(&mut self) -> PipelineResult<RgbaImage> {
        if let Some(limit) = self.unplug_after {
            if self.frame_count >= limit {
                self.track.stop();
                return Err(PipelineError::StreamLost);
            }
        }
        self.frame_count += 1;
        Ok(self.generate())
    }

    fn close(&mut self) {
        log::debug!("SyntheticMedia: closed source after {} frames", self.frame_count);
    }
}
