//! Device selector: enumerate video inputs and pick the selfie camera.

use std::sync::OnceLock;

use regex::Regex;

use super::media::{Device, DeviceKind, FacingMode, MediaDevices, VideoConstraints};
use crate::error::{PipelineError, PipelineResult};

fn front_camera_pattern() -> &'static Regex {
    static FRONT_RE: OnceLock<Regex> = OnceLock::new();
    FRONT_RE.get_or_init(|| Regex::new(r"(?i)front|selfie|user|facetime").unwrap())
}

/// True when a device label reads like a user-facing camera.
pub(crate) fn is_front_label(label: &str) -> bool {
    front_camera_pattern().is_match(label)
}

fn video_inputs(devices: Vec<Device>) -> Vec<Device> {
    devices
        .into_iter()
        .filter(|d| d.kind == DeviceKind::VideoInput)
        .collect()
}

/// Enumerate video inputs, unlocking labels first if the platform hides them.
///
/// Labels stay empty until a stream has been granted once. In that case a
/// throwaway stream is acquired and released immediately, then the list is
/// re-read.
pub fn list_video_inputs(media: &mut dyn MediaDevices) -> PipelineResult<Vec<Device>> {
    let mut devices = video_inputs(media.enumerate_devices()?);

    if !devices.is_empty() && !devices.iter().any(Device::has_label) {
        log::debug!("DeviceSelector: labels hidden, acquiring throwaway stream");
        let mut unlock = media.get_user_media(&VideoConstraints::Facing(FacingMode::User))?;
        unlock.stop();
        devices = video_inputs(media.enumerate_devices()?);
    }

    if devices.is_empty() {
        return Err(PipelineError::NoDeviceFound);
    }
    log::debug!("DeviceSelector: {} video input(s)", devices.len());
    Ok(devices)
}

/// Pick the device most likely to face the user.
///
/// Label match first; unlabeled multi-camera setups usually enumerate the
/// front camera second.
pub fn pick_front(devices: &[Device]) -> PipelineResult<&Device> {
    if let Some(device) = devices
        .iter()
        .find(|d| is_front_label(&d.label))
    {
        return Ok(device);
    }
    if devices.len() > 1 {
        return Ok(&devices[1]);
    }
    devices.first().ok_or(PipelineError::NoDeviceFound)
}
