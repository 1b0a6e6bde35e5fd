//! Capture pipeline: owns the single live stream and composites its frames.

use super::media::{Device, FacingMode, MediaDevices, MediaStream, VideoConstraints};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::RasterBuffer;

/// How many reads `await_first_frame` tolerates before giving up on a stream.
const FIRST_FRAME_ATTEMPTS: u32 = 30;

/// Frame statistics for the active stream.
#[derive(Clone, Debug, Default)]
pub struct CaptureStats {
    pub frames_composited: u64,
    pub streams_started: u64,
}

pub struct CapturePipeline {
    media: Box<dyn MediaDevices>,
    active: Option<MediaStream>,
    stats: CaptureStats,
}

impl CapturePipeline {
    pub fn new(media: Box<dyn MediaDevices>) -> Self {
        Self {
            media,
            active: None,
            stats: CaptureStats::default(),
        }
    }

    /// The media layer, for device enumeration.
    pub fn media_mut(&mut self) -> &mut dyn MediaDevices {
        self.media.as_mut()
    }

    pub fn active_stream(&self) -> Option<&MediaStream> {
        self.active.as_ref()
    }

    pub fn has_live_stream(&self) -> bool {
        self.active.as_ref().is_some_and(MediaStream::is_live)
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// Acquire a stream for `device`, replacing any previous stream.
    ///
    /// The previous stream is stopped before the new request so the two never
    /// contend for the same hardware. Exact device id is tried first, then any
    /// user-facing camera.
    pub fn start(&mut self, device: &Device) -> PipelineResult<&MediaStream> {
        self.open(device, true)
    }

    /// Like `start`, but only the exact device is acceptable.
    ///
    /// Used when the user picked a camera explicitly; opening some other
    /// camera instead would misreport which one is live.
    pub fn start_exact(&mut self, device: &Device) -> PipelineResult<&MediaStream> {
        self.open(device, false)
    }

    fn open(&mut self, device: &Device, facing_fallback: bool) -> PipelineResult<&MediaStream> {
        self.stop();

        let exact = VideoConstraints::ExactDevice(device.id.clone());
        let stream = match self.media.get_user_media(&exact) {
            Ok(stream) => stream,
            Err(exact_err) if !facing_fallback => {
                return Err(PipelineError::camera_unavailable(format!(
                    "exact device {}: {}",
                    device.id, exact_err
                )));
            }
            Err(exact_err) => {
                log::warn!(
                    "CapturePipeline: exact device {} failed ({}), falling back to facing mode",
                    device.id,
                    exact_err
                );
                self.media
                    .get_user_media(&VideoConstraints::Facing(FacingMode::User))
                    .map_err(|facing_err| {
                        PipelineError::camera_unavailable(format!(
                            "exact device {}: {}; facing mode: {}",
                            device.id, exact_err, facing_err
                        ))
                    })?
            }
        };

        log::info!(
            "CapturePipeline: stream started on {} ({} track(s))",
            stream.device_id(),
            stream.tracks().len()
        );
        self.stats.streams_started += 1;
        Ok(self.active.insert(stream))
    }

    /// Read until the stream delivers a frame.
    ///
    /// Used between acquisition and `Active`: the camera only counts as started
    /// once frames flow.
    pub fn await_first_frame(&mut self) -> PipelineResult<()> {
        let stream = self
            .active
            .as_mut()
            .ok_or_else(|| PipelineError::camera_unavailable("no stream to wait on"))?;
        let mut last_err = None;
        for _ in 0..FIRST_FRAME_ATTEMPTS {
            match stream.read_frame() {
                Ok(_) => return Ok(()),
                Err(PipelineError::StreamLost) => return Err(PipelineError::StreamLost),
                Err(err) => last_err = Some(err),
            }
        }
        Err(PipelineError::camera_unavailable(format!(
            "stream produced no frames: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Stop and release the active stream, if any.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.active.take() {
            stream.stop();
            log::info!("CapturePipeline: stream on {} stopped", stream.device_id());
        }
    }

    /// Draw the current frame over the whole buffer, mirrored if asked.
    pub fn composite_frame(&mut self, buffer: &mut RasterBuffer, mirror: bool) -> PipelineResult<()> {
        let stream = self.active.as_mut().ok_or(PipelineError::StreamLost)?;
        let frame = stream.read_frame()?;
        buffer.draw_stretched(&frame, mirror);
        self.stats.frames_composited += 1;
        Ok(())
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
