//! V4L2 media backend.
//!
//! Exposes local capture nodes (`/dev/video*`) through `MediaDevices`. Linux
//! reports device names without a permission prompt, so labels are always
//! populated and the selector never needs its unlock stream here.

use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbaImage;
use ouroboros::self_referencing;

use super::media::{
    Device, DeviceKind, FacingMode, MediaDevices, MediaStream, MediaTrack, VideoConstraints,
    VideoSource,
};
use super::normalize::{normalize_to_rgba, PixelFormat};
use super::selector::{is_front_label, pick_front};
use crate::error::{PipelineError, PipelineResult};

/// Capture settings requested from the driver.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

pub struct V4l2Media {
    config: V4l2Config,
    streams_opened: u64,
}

impl V4l2Media {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            config,
            streams_opened: 0,
        }
    }

    fn open(&mut self, path: &str) -> PipelineResult<MediaStream> {
        let source = DeviceV4l2Source::open(&self.config, Path::new(path))
            .map_err(|err| PipelineError::camera_unavailable(format!("{:#}", err)))?;
        self.streams_opened += 1;
        let track = MediaTrack::new(format!("v4l2-{}", self.streams_opened), source.label.clone());
        let source = DeviceV4l2Source {
            track: Some(track.clone()),
            ..source
        };
        Ok(MediaStream::new(path, vec![track], Box::new(source)))
    }
}

impl MediaDevices for V4l2Media {
    fn enumerate_devices(&mut self) -> PipelineResult<Vec<Device>> {
        use v4l::capability::Flags;

        let mut devices = Vec::new();
        for node in v4l::context::enum_devices() {
            let path = node.path().to_path_buf();
            let caps = match v4l::Device::with_path(&path).and_then(|d| d.query_caps()) {
                Ok(caps) => caps,
                Err(err) => {
                    log::debug!("V4l2Media: skipping {}: {}", path.display(), err);
                    continue;
                }
            };
            if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(Device {
                id: path.display().to_string(),
                label: node.name().unwrap_or(caps.card),
                kind: DeviceKind::VideoInput,
            });
        }
        Ok(devices)
    }

    fn get_user_media(&mut self, constraints: &VideoConstraints) -> PipelineResult<MediaStream> {
        match constraints {
            VideoConstraints::ExactDevice(id) => self.open(id),
            VideoConstraints::Facing(mode) => {
                let devices = self.enumerate_devices()?;
                let chosen = match mode {
                    FacingMode::User => pick_front(&devices)?,
                    FacingMode::Environment => devices
                        .iter()
                        .find(|d| !is_front_label(&d.label))
                        .or_else(|| devices.first())
                        .ok_or(PipelineError::NoDeviceFound)?,
                };
                let id = chosen.id.clone();
                self.open(&id)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Device source using libv4l
// ----------------------------------------------------------------------------

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this>,
}

struct DeviceV4l2Source {
    path: PathBuf,
    label: String,
    state: Option<DeviceV4l2State>,
    format: PixelFormat,
    width: u32,
    height: u32,
    track: Option<MediaTrack>,
}

impl DeviceV4l2Source {
    fn open(config: &V4l2Config, path: &Path) -> anyhow::Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(path)
            .with_context(|| format!("open v4l2 device {}", path.display()))?;
        let label = device
            .query_caps()
            .map(|caps| caps.card)
            .unwrap_or_else(|_| path.display().to_string());

        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Media: failed to set format on {}: {}",
                    path.display(),
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr)
            .with_context(|| format!("unsupported v4l2 pixel format {}", format.fourcc))?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Media: failed to set fps on {}: {}", path.display(), err);
            }
        }

        let state = DeviceV4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Media: opened {} ({}x{} {:?})",
            path.display(),
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            path: path.to_path_buf(),
            label,
            state: Some(state),
            format: pixel_format,
            width: format.width,
            height: format.height,
            track: None,
        })
    }

    fn lost(&self) -> PipelineError {
        if let Some(track) = &self.track {
            track.stop();
        }
        PipelineError::StreamLost
    }
}

impl VideoSource for DeviceV4l2Source {
    fn read_frame(&mut self) -> PipelineResult<RgbaImage> {
        use v4l::io::traits::CaptureStream;

        if !self.path.exists() {
            return Err(self.lost());
        }
        let state = self.state.as_mut().ok_or(PipelineError::StreamLost)?;
        let (format, width, height) = (self.format, self.width, self.height);
        let captured = state.with_stream_mut(|stream| {
            stream
                .next()
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))
                .and_then(|(buf, _meta)| normalize_to_rgba(buf, width, height, format))
        });
        match captured {
            Ok(frame) => Ok(frame),
            // unplugged between the check above and the ioctl
            Err(_) if !self.path.exists() => Err(self.lost()),
            Err(err) => Err(err.into()),
        }
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Media: released {}", self.path.display());
        }
    }
}
