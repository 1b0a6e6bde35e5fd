//! live_verdict - live camera classifier with a pass/fail verdict
//!
//! Runs the camera until Ctrl-C (or `--seconds`), classifying every frame and
//! rendering the target label's confidence as a meter. With `--image` it
//! classifies one still instead.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use live_verdict::scheduler::{self, FramePacer, IntervalPacer};
use live_verdict::{
    list_video_inputs, AppConfig, CameraController, ClassifierSlot, MediaDevices, Session,
    StubClassifier, SyntheticMedia, TerminalSurface, UiMode,
};

const MODEL_SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Classify one still image (PNG/JPEG) and exit.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Stop the camera after this many seconds (default: run until Ctrl-C).
    #[arg(long)]
    seconds: Option<u64>,
    /// Use synthetic stub:// cameras instead of real devices.
    #[arg(long, env = "VERDICT_SYNTHETIC")]
    synthetic: bool,
    /// Output style: auto, plain, pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
    /// Print the available video inputs and exit.
    #[arg(long)]
    list_devices: bool,
}

/// Interval pacing plus an optional wall-clock limit on the run.
struct BoundedPacer {
    inner: IntervalPacer,
    deadline: Option<Instant>,
    controller: CameraController,
}

impl FramePacer for BoundedPacer {
    fn wait_for_next_frame(&mut self) {
        self.inner.wait_for_next_frame();
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            if let Err(err) = self.controller.request_stop() {
                log::warn!("live_verdict: stop request failed: {}", err);
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    let surface = TerminalSurface::new(
        UiMode::from_flag(Some(args.ui.as_str())),
        std::io::stderr().is_terminal(),
    );
    let mut media = open_media(&args, &config);

    if args.list_devices {
        for device in list_video_inputs(media.as_mut())? {
            println!("{}\t{}", device.id, device.label);
        }
        return Ok(());
    }

    let classifier = boot_classifier(&config)?;

    if let Some(path) = args.image.as_deref() {
        {
            let _stage = surface.stage("load classifier");
            let status = classifier.wait_until_settled(MODEL_SETTLE_TIMEOUT);
            log::debug!("live_verdict: classifier {:?}", status);
        }
        let mut session = Session::new(config, media, classifier, Box::new(surface))?;
        let verdict = session.classify_image_file(path)?;
        println!(
            "{}\t{}%\t{}",
            path.display(),
            verdict.percentage,
            if verdict.pass { "pass" } else { "fail" }
        );
        return Ok(());
    }

    let target_fps = config.capture.target_fps;
    let mut session = Session::new(config, media, classifier, Box::new(surface))?;

    let stop_handle = session.controller();
    ctrlc::set_handler(move || {
        if let Err(err) = stop_handle.request_stop() {
            log::warn!("live_verdict: stop request failed: {}", err);
        }
    })
    .context("failed to install Ctrl-C handler")?;

    session.start_camera()?;
    if !session.controller().is_active() {
        log::info!("live_verdict: stopped before the first frame");
        return Ok(());
    }
    log::info!("live_verdict running at {} fps (Ctrl-C to stop)", target_fps);

    let mut pacer = BoundedPacer {
        inner: IntervalPacer::from_fps(target_fps),
        deadline: args
            .seconds
            .map(|secs| Instant::now() + Duration::from_secs(secs)),
        controller: session.controller(),
    };
    let stats = scheduler::run(&mut session, &mut pacer);
    log::info!(
        "live_verdict done: rendered={} skipped={} failed={} stream_lost={}",
        stats.rendered,
        stats.skipped,
        stats.failed,
        stats.stream_lost
    );
    Ok(())
}

fn open_media(args: &Args, config: &AppConfig) -> Box<dyn MediaDevices> {
    if args.synthetic {
        return Box::new(SyntheticMedia::phone());
    }
    device_media(config)
}

#[cfg(feature = "ingest-v4l2")]
fn device_media(config: &AppConfig) -> Box<dyn MediaDevices> {
    use live_verdict::{V4l2Config, V4l2Media};

    Box::new(V4l2Media::new(V4l2Config {
        target_fps: config.capture.target_fps,
        ..V4l2Config::default()
    }))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn device_media(_config: &AppConfig) -> Box<dyn MediaDevices> {
    log::warn!("live_verdict: built without ingest-v4l2, using synthetic cameras");
    Box::new(SyntheticMedia::phone())
}

/// Start loading the configured model, or install the stub classifier.
fn boot_classifier(config: &AppConfig) -> Result<ClassifierSlot> {
    let (model, metadata) = match (&config.model.model_path, &config.model.metadata_path) {
        (Some(model), Some(metadata)) => (model.clone(), metadata.clone()),
        _ => {
            log::warn!("live_verdict: no model configured, using the brightness stub classifier");
            return Ok(ClassifierSlot::with_backend(StubClassifier::default()));
        }
    };
    let slot = ClassifierSlot::empty();
    log::info!("live_verdict: loading model {}", model.display());
    slot.load_in_background(move || load_model(model, metadata))?;
    Ok(slot)
}

#[cfg(feature = "backend-tract")]
fn load_model(
    model: PathBuf,
    metadata: PathBuf,
) -> Result<Box<dyn live_verdict::ClassifierBackend>> {
    let classifier = live_verdict::TractClassifier::load(&model, &metadata)?;
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model(
    model: PathBuf,
    _metadata: PathBuf,
) -> Result<Box<dyn live_verdict::ClassifierBackend>> {
    Err(anyhow::anyhow!(
        "{} needs the backend-tract feature",
        model.display()
    ))
}
