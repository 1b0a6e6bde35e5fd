//! Session context.
//!
//! A `Session` owns everything one classifier page owns: the camera state,
//! the capture pipeline with its single live stream, the raster buffer, the
//! classifier slot and the verdict surface. Both input paths (live cycles and
//! static images) take `&mut Session`, so a frame is always composited,
//! classified and rendered before the next one touches the buffer.

use std::path::Path;

use anyhow::Result;
use image::RgbaImage;

use crate::camera::{CameraController, CameraEvent, CameraState};
use crate::classify::{ClassifierSlot, LoadStatus};
use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::RasterBuffer;
use crate::ingest::{
    composite_image, decode_image, list_video_inputs, pick_front, read_image, CapturePipeline,
    CaptureStats, Device, MediaDevices,
};
use crate::ui::{render_result, VerdictSurface};
use crate::verdict::{evaluate, Verdict};

/// What one live cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A frame was classified and the verdict rendered.
    Rendered(Verdict),
    /// The frame was composited but no classifier is loaded yet.
    Skipped,
    /// The device went away; the camera is now Stopped.
    StreamLost,
}

pub struct Session {
    config: AppConfig,
    camera: CameraController,
    capture: CapturePipeline,
    buffer: RasterBuffer,
    classifier: ClassifierSlot,
    surface: Box<dyn VerdictSurface>,
    model_failure_reported: bool,
}

impl Session {
    pub fn new(
        config: AppConfig,
        media: Box<dyn MediaDevices>,
        classifier: ClassifierSlot,
        surface: Box<dyn VerdictSurface>,
    ) -> Result<Self> {
        let buffer = RasterBuffer::new(config.raster.width, config.raster.height)?;
        let mut session = Self {
            config,
            camera: CameraController::new(),
            capture: CapturePipeline::new(media),
            buffer,
            classifier,
            surface,
            model_failure_reported: false,
        };
        session.render_affordances();
        Ok(session)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// A shared handle on the camera state, e.g. for a Ctrl-C handler.
    pub fn controller(&self) -> CameraController {
        self.camera.clone()
    }

    pub fn camera_state(&self) -> CameraState {
        self.camera.state()
    }

    pub fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    pub fn classifier(&self) -> &ClassifierSlot {
        &self.classifier
    }

    pub fn capture_stats(&self) -> &CaptureStats {
        self.capture.stats()
    }

    pub fn has_live_stream(&self) -> bool {
        self.capture.has_live_stream()
    }

    pub fn list_devices(&mut self) -> PipelineResult<Vec<Device>> {
        list_video_inputs(self.capture.media_mut())
    }

    /// Start the camera: select a device, acquire it and wait for frames.
    ///
    /// Ignored unless the camera is Idle or Stopped. On failure the error is
    /// shown on the surface, the state passes through Failed back to Idle and
    /// the error is returned.
    pub fn start_camera(&mut self) -> PipelineResult<()> {
        if self.camera.apply(CameraEvent::Start)?.is_none() {
            log::debug!("Session: start ignored in {:?}", self.camera.state());
            return Ok(());
        }
        self.render_affordances();
        let acquired = self.acquire();
        self.finish_start(acquired)
    }

    /// Move out of Requesting once acquisition has settled.
    fn finish_start(&mut self, acquired: PipelineResult<Device>) -> PipelineResult<()> {
        match acquired {
            Ok(device) => {
                self.camera.apply(CameraEvent::StreamReady)?;
                self.render_affordances();
                log::info!("Session: camera active on {} ({})", device.id, device.label);
                if self.camera.take_pending_stop() {
                    log::info!("Session: stop requested during acquisition");
                    self.stop_camera()?;
                }
                Ok(())
            }
            Err(err) => {
                self.capture.stop();
                self.camera.take_pending_stop();
                self.camera.apply(CameraEvent::AcquisitionFailed)?;
                self.render_affordances();
                log::warn!("Session: camera start failed: {}", err);
                self.surface.notify_error(&err);
                self.camera.apply(CameraEvent::ErrorAcknowledged)?;
                self.render_affordances();
                Err(err)
            }
        }
    }

    fn acquire(&mut self) -> PipelineResult<Device> {
        let devices = list_video_inputs(self.capture.media_mut())?;
        let configured = self
            .config
            .capture
            .device
            .as_deref()
            .and_then(|id| devices.iter().find(|d| d.id == id));
        if self.config.capture.device.is_some() && configured.is_none() {
            log::warn!(
                "Session: configured device {:?} not present, using front camera",
                self.config.capture.device
            );
        }
        let device = match configured {
            Some(device) => device.clone(),
            None => pick_front(&devices)?.clone(),
        };
        self.capture.start(&device)?;
        self.capture.await_first_frame()?;
        Ok(device)
    }

    /// Switch the active camera to `device_id`.
    ///
    /// Ignored unless the camera is Active. The switch is a stop followed by
    /// a fresh start on exactly that device: there is no facing-mode
    /// fallback, and a failure goes through Failed back to Idle like any
    /// other start.
    pub fn switch_device(&mut self, device_id: &str) -> PipelineResult<()> {
        if !self.camera.is_active() {
            log::debug!("Session: switch ignored in {:?}", self.camera.state());
            return Ok(());
        }
        let devices = list_video_inputs(self.capture.media_mut())?;
        let device = devices
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
            .ok_or(PipelineError::NoDeviceFound)?;

        self.stop_camera()?;
        if self.camera.apply(CameraEvent::Start)?.is_none() {
            log::debug!("Session: switch ignored in {:?}", self.camera.state());
            return Ok(());
        }
        self.render_affordances();
        let acquired = self
            .capture
            .start_exact(&device)
            .map(|_| ())
            .and_then(|()| self.capture.await_first_frame())
            .map(|()| device);
        self.finish_start(acquired)
    }

    /// Stop the camera. Returns `false` if it was not Active.
    pub fn stop_camera(&mut self) -> Result<bool> {
        let stopped = self.camera.apply(CameraEvent::Stop)?.is_some();
        self.release_stream();
        self.render_affordances();
        Ok(stopped)
    }

    /// Release the stream unless the camera is Active.
    ///
    /// The render loop calls this on exit, so a stop requested from another
    /// thread still ends every track.
    pub fn release_stream(&mut self) {
        if !self.camera.is_active() {
            self.capture.stop();
        }
    }

    /// One live iteration: composite, classify, evaluate, render.
    pub fn live_cycle(&mut self) -> PipelineResult<CycleOutcome> {
        let mirror = self.config.capture.mirror;
        match self.capture.composite_frame(&mut self.buffer, mirror) {
            Ok(()) => {}
            Err(PipelineError::StreamLost) => {
                self.handle_stream_loss()?;
                return Ok(CycleOutcome::StreamLost);
            }
            Err(err) => return Err(err),
        }
        match self.classify_and_render() {
            Ok(verdict) => Ok(CycleOutcome::Rendered(verdict)),
            Err(PipelineError::ClassifierUnavailable) => {
                self.report_model_failure();
                Ok(CycleOutcome::Skipped)
            }
            Err(err) => Err(err),
        }
    }

    /// Notify once if the background model load failed.
    fn report_model_failure(&mut self) {
        if self.model_failure_reported {
            return;
        }
        if let LoadStatus::Failed(reason) = self.classifier.status() {
            self.model_failure_reported = true;
            self.surface.notify_error(&PipelineError::ModelLoadFailed { reason });
        }
    }

    fn handle_stream_loss(&mut self) -> PipelineResult<()> {
        log::warn!("Session: camera stream lost");
        self.camera.apply(CameraEvent::StreamLost)?;
        self.capture.stop();
        self.render_affordances();
        self.surface.notify_error(&PipelineError::StreamLost);
        Ok(())
    }

    /// Classify encoded image bytes (PNG/JPEG).
    pub fn classify_image(&mut self, bytes: &[u8]) -> PipelineResult<Verdict> {
        let image = decode_image(bytes)?;
        self.classify_still(&image)
    }

    pub fn classify_image_file(&mut self, path: &Path) -> PipelineResult<Verdict> {
        let image = read_image(path)?;
        self.classify_still(&image)
    }

    /// Letterbox `image` into the buffer and run one classification.
    ///
    /// Works in any camera state. A running camera overwrites the buffer on
    /// its next cycle.
    pub fn classify_still(&mut self, image: &RgbaImage) -> PipelineResult<Verdict> {
        let placement = composite_image(image, &mut self.buffer);
        log::debug!(
            "Session: still {}x{} placed at ({}, {}) scale {:.3}",
            image.width(),
            image.height(),
            placement.x,
            placement.y,
            placement.scale
        );
        let verdict = self.classify_and_render();
        if matches!(verdict, Err(PipelineError::ClassifierUnavailable)) {
            self.report_model_failure();
        }
        verdict
    }

    fn classify_and_render(&mut self) -> PipelineResult<Verdict> {
        let prediction = self.classifier.classify(&self.buffer)?;
        let verdict = evaluate(
            &prediction,
            &self.config.target_label,
            self.config.threshold,
        );
        render_result(
            self.surface.as_mut(),
            &prediction,
            &verdict,
            &self.config.pass_message,
        );
        Ok(verdict)
    }

    /// Show an error that did not come from a session operation.
    pub fn notify(&mut self, error: &PipelineError) {
        self.surface.notify_error(error);
    }

    fn render_affordances(&mut self) {
        let affordances = self.camera.affordances();
        self.surface.render_affordances(affordances);
    }
}
