//! End-to-end tests for the camera session and render loop.
//!
//! These tests verify that:
//! 1. The camera only reaches Active through Requesting, and start/stop
//!    affordances follow the state
//! 2. Restarting the camera leaves exactly one live stream
//! 3. Acquisition failures, including a switch to a busy camera, are
//!    notified and return the camera to Idle
//! 4. A lost device stops the loop and releases the stream, and a stop
//!    pressed while the camera is being requested still ends the run
//! 5. Live frames are mirrored, stills are letterboxed and never mirrored
//! 6. Frames are skipped until the classifier has loaded

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};

use live_verdict::ingest::{Device, MediaStream, VideoConstraints};
use live_verdict::scheduler::{self, IntervalPacer};
use live_verdict::{
    AppConfig, CameraController, CameraState, ClassScore, ClassifierBackend, ClassifierSlot,
    CycleOutcome, MediaDevices, MemorySurface, PipelineError, PipelineResult, Session,
    SyntheticMedia,
};

/// Returns fixed scores and records what it was asked to classify.
struct ScriptedClassifier {
    labels: Vec<String>,
    scores: Vec<f64>,
    seen: Arc<Mutex<Vec<SeenFrame>>>,
}

#[derive(Clone, Debug)]
struct SeenFrame {
    width: u32,
    height: u32,
    flip: bool,
    left_column: Rgba<u8>,
}

impl ScriptedClassifier {
    fn new(scores: &[(&str, f64)]) -> (Self, Arc<Mutex<Vec<SeenFrame>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let classifier = Self {
            labels: scores.iter().map(|(l, _)| l.to_string()).collect(),
            scores: scores.iter().map(|(_, p)| *p).collect(),
            seen: Arc::clone(&seen),
        };
        (classifier, seen)
    }
}

impl ClassifierBackend for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        flip_horizontal: bool,
    ) -> anyhow::Result<Vec<ClassScore>> {
        let mid_row = (height / 2 * width * 4) as usize;
        let px = &pixels[mid_row..mid_row + 4];
        self.seen.lock().unwrap().push(SeenFrame {
            width,
            height,
            flip: flip_horizontal,
            left_column: Rgba([px[0], px[1], px[2], px[3]]),
        });
        Ok(self
            .labels
            .iter()
            .zip(&self.scores)
            .map(|(label, p)| ClassScore::new(label.clone(), *p))
            .collect())
    }
}

/// Media layer whose user hits Ctrl-C while the camera request is pending.
struct StopWhileRequesting {
    inner: SyntheticMedia,
    controller: Arc<Mutex<Option<CameraController>>>,
}

impl MediaDevices for StopWhileRequesting {
    fn enumerate_devices(&mut self) -> PipelineResult<Vec<Device>> {
        self.inner.enumerate_devices()
    }

    fn get_user_media(&mut self, constraints: &VideoConstraints) -> PipelineResult<MediaStream> {
        if let Some(controller) = self.controller.lock().unwrap().as_ref() {
            assert_eq!(controller.state(), CameraState::Requesting);
            assert!(!controller.request_stop().unwrap());
        }
        self.inner.get_user_media(constraints)
    }
}

fn new_session(media: SyntheticMedia, slot: ClassifierSlot) -> (Session, MemorySurface) {
    new_session_with(AppConfig::default(), media, slot)
}

fn new_session_with(
    config: AppConfig,
    media: SyntheticMedia,
    slot: ClassifierSlot,
) -> (Session, MemorySurface) {
    let surface = MemorySurface::new();
    let session = Session::new(config, Box::new(media), slot, Box::new(surface.clone()))
        .expect("session");
    (session, surface)
}

fn passing_classifier() -> (ClassifierSlot, Arc<Mutex<Vec<SeenFrame>>>) {
    let (classifier, seen) = ScriptedClassifier::new(&[("Other", 0.3), ("STEM Teacher", 0.7)]);
    (ClassifierSlot::with_backend(classifier), seen)
}

fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

#[test]
fn start_and_stop_follow_camera_states() {
    let media = SyntheticMedia::phone();
    let tracks = media.track_log();
    let (mut session, surface) = new_session(media, ClassifierSlot::empty());

    assert!(!session.stop_camera().unwrap(), "stop while idle is a no-op");
    assert_eq!(session.camera_state(), CameraState::Idle);

    session.start_camera().unwrap();
    assert_eq!(session.camera_state(), CameraState::Active);
    let affordances = surface.snapshot().affordances.unwrap();
    assert!(!affordances.start_enabled);
    assert!(affordances.stop_enabled);

    assert!(session.stop_camera().unwrap());
    assert_eq!(session.camera_state(), CameraState::Stopped);
    assert_eq!(tracks.live_count(), 0);
    let affordances = surface.snapshot().affordances.unwrap();
    assert!(affordances.start_enabled);
    assert!(!affordances.stop_enabled);
}

#[test]
fn restart_leaves_exactly_one_live_stream() {
    let media = SyntheticMedia::phone();
    let tracks = media.track_log();
    let (mut session, _) = new_session(media, ClassifierSlot::empty());

    session.start_camera().unwrap();
    session.stop_camera().unwrap();
    session.start_camera().unwrap();

    let issued = tracks.issued();
    assert_eq!(issued.len(), 2);
    assert!(issued[0].ready_state() == live_verdict::ingest::TrackState::Ended);
    assert!(issued[1].is_live());
    assert_eq!(tracks.live_count(), 1);
    assert!(session.has_live_stream());
}

#[test]
fn switching_to_a_busy_camera_fails_without_substituting() {
    let media = SyntheticMedia::phone().with_busy_device("stub://back");
    let tracks = media.track_log();
    let (mut session, surface) = new_session(media, ClassifierSlot::empty());
    session.start_camera().unwrap();

    let err = session.switch_device("stub://back").unwrap_err();
    assert!(matches!(err, PipelineError::CameraUnavailable { .. }));

    // Requesting -> Failed -> Idle, and the front camera was not reopened
    assert_eq!(session.camera_state(), CameraState::Idle);
    assert_eq!(tracks.live_count(), 0);
    let issued = tracks.issued();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].label, "Front Camera");

    let snap = surface.snapshot();
    assert_eq!(snap.notifications.len(), 1);
    assert!(snap.notifications[0].contains("busy"));
    assert!(snap.affordances.unwrap().start_enabled);
}

#[test]
fn stop_pressed_during_camera_request_is_honoured() {
    let controller_slot = Arc::new(Mutex::new(None));
    let inner = SyntheticMedia::phone();
    let tracks = inner.track_log();
    let media = StopWhileRequesting {
        inner,
        controller: Arc::clone(&controller_slot),
    };
    let mut session = Session::new(
        AppConfig::default(),
        Box::new(media),
        ClassifierSlot::empty(),
        Box::new(MemorySurface::new()),
    )
    .expect("session");
    *controller_slot.lock().unwrap() = Some(session.controller());

    session.start_camera().unwrap();

    assert_eq!(session.camera_state(), CameraState::Stopped);
    assert_eq!(tracks.live_count(), 0);
    let stats = scheduler::run(&mut session, &mut || {});
    assert_eq!(stats.iterations, 0);
}

#[test]
fn denied_permission_notifies_and_returns_to_idle() {
    let media = SyntheticMedia::phone().deny_permission();
    let tracks = media.track_log();
    let (mut session, surface) = new_session(media, ClassifierSlot::empty());

    let err = session.start_camera().unwrap_err();
    assert!(matches!(err, PipelineError::CameraUnavailable { .. }));
    assert_eq!(session.camera_state(), CameraState::Idle);
    assert_eq!(tracks.live_count(), 0);

    let snap = surface.snapshot();
    assert_eq!(snap.notifications.len(), 1);
    assert!(snap.notifications[0].contains("permission denied"));
    assert!(snap.affordances.unwrap().start_enabled);

    // no automatic retry: the caller starts again explicitly
    assert_eq!(session.capture_stats().streams_started, 0);
}

#[test]
fn no_devices_is_reported() {
    let (mut session, surface) = new_session(SyntheticMedia::new(Vec::new()), ClassifierSlot::empty());

    let err = session.start_camera().unwrap_err();
    assert!(matches!(err, PipelineError::NoDeviceFound));
    assert_eq!(session.camera_state(), CameraState::Idle);
    assert_eq!(surface.snapshot().notifications, vec!["no video input device found"]);
}

#[test]
fn hidden_labels_still_select_front_camera() {
    let media = SyntheticMedia::new(vec![
        Device::video("stub://0", "Rear Wide"),
        Device::video("stub://1", "Selfie Cam"),
        Device::video("stub://2", "Rear Tele"),
    ])
    .with_hidden_labels();
    let tracks = media.track_log();
    let (mut session, _) = new_session(media, ClassifierSlot::empty());

    session.start_camera().unwrap();

    // one throwaway stream for the label unlock, then the real one
    let issued = tracks.issued();
    assert_eq!(issued.last().unwrap().label, "Selfie Cam");
    assert_eq!(tracks.live_count(), 1);
}

#[test]
fn live_frames_are_mirrored_and_classified_unflipped() {
    let (slot, seen) = passing_classifier();
    let (mut session, surface) = new_session(SyntheticMedia::phone(), slot);
    session.start_camera().unwrap();

    let outcome = session.live_cycle().unwrap();
    let CycleOutcome::Rendered(verdict) = outcome else {
        panic!("expected a rendered frame, got {:?}", outcome);
    };
    assert_eq!(verdict.percentage, 70);
    assert!(verdict.pass);

    // the synthetic gradient brightens to the right; mirrored, the left is brightest
    let buffer = session.buffer();
    let y = buffer.height() / 2;
    assert!(buffer.pixel(0, y)[0] > buffer.pixel(buffer.width() - 1, y)[0]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].flip);
    assert_eq!((seen[0].width, seen[0].height), (224, 224));

    let snap = surface.snapshot();
    assert_eq!(snap.aria_value_now.as_deref(), Some("70"));
    assert_eq!(snap.verdict_text.as_deref(), Some("You're a STEM Educator ✅"));
    assert_eq!(
        snap.labels,
        vec![
            ("STEM Teacher".to_string(), "70.0%".to_string()),
            ("Other".to_string(), "30.0%".to_string()),
        ]
    );
}

#[test]
fn mirroring_can_be_disabled() {
    let mut config = AppConfig::default();
    config.capture.mirror = false;
    let (slot, _) = passing_classifier();
    let (mut session, _) = new_session_with(config, SyntheticMedia::phone(), slot);
    session.start_camera().unwrap();
    session.live_cycle().unwrap();

    let buffer = session.buffer();
    let y = buffer.height() / 2;
    assert!(buffer.pixel(0, y)[0] < buffer.pixel(buffer.width() - 1, y)[0]);
}

#[test]
fn uploaded_image_is_letterboxed_and_not_mirrored() {
    let (slot, seen) = passing_classifier();
    let (mut session, surface) = new_session(SyntheticMedia::phone(), slot);

    // wide image: red left half, blue right half
    let image = RgbaImage::from_fn(200, 100, |x, _| {
        if x < 100 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    });
    let verdict = session.classify_image(&png_bytes(&image)).unwrap();
    assert!(verdict.pass);
    assert_eq!(session.camera_state(), CameraState::Idle);

    let buffer = session.buffer();
    // 200x100 into 224x224: 224x112, centered with 56px bands top and bottom
    assert_eq!(buffer.pixel(112, 10)[3], 0);
    assert_eq!(buffer.pixel(112, 213)[3], 0);
    assert_eq!(buffer.pixel(10, 112), Rgba([255, 0, 0, 255]));
    assert_eq!(buffer.pixel(213, 112), Rgba([0, 0, 255, 255]));

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].left_column, Rgba([255, 0, 0, 255]));
    assert!(!seen[0].flip);
    assert_eq!(surface.snapshot().results_rendered, 1);
}

#[test]
fn undecodable_upload_is_an_error() {
    let (slot, _) = passing_classifier();
    let (mut session, surface) = new_session(SyntheticMedia::phone(), slot);

    let err = session.classify_image(b"definitely not a png").unwrap_err();
    assert!(matches!(err, PipelineError::ImageDecode(_)));
    assert_eq!(surface.snapshot().results_rendered, 0);
}

#[test]
fn target_label_matching_ignores_case_and_whitespace() {
    let (classifier, _) = ScriptedClassifier::new(&[(" stem teacher ", 0.6), ("Other", 0.4)]);
    let (mut session, surface) =
        new_session(SyntheticMedia::phone(), ClassifierSlot::with_backend(classifier));

    let verdict = session
        .classify_still(&RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255])))
        .unwrap();
    assert_eq!(verdict.percentage, 60);
    assert!(verdict.pass);
    assert!(surface.snapshot().verdict_text.is_some());
}

#[test]
fn failing_verdict_clears_pass_message() {
    let (classifier, _) = ScriptedClassifier::new(&[("STEM Teacher", 0.49), ("Other", 0.51)]);
    let (mut session, surface) =
        new_session(SyntheticMedia::phone(), ClassifierSlot::with_backend(classifier));

    let verdict = session
        .classify_still(&RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255])))
        .unwrap();
    assert_eq!(verdict.percentage, 49);
    assert!(!verdict.pass);
    assert_eq!(surface.snapshot().verdict_text, None);
}

#[test]
fn frames_are_skipped_until_classifier_loads() {
    let slot = ClassifierSlot::empty();
    let (mut session, surface) = new_session(SyntheticMedia::phone(), slot.clone());
    session.start_camera().unwrap();

    assert_eq!(session.live_cycle().unwrap(), CycleOutcome::Skipped);
    assert!(matches!(
        session.classify_still(&RgbaImage::new(4, 4)),
        Err(PipelineError::ClassifierUnavailable)
    ));

    let (classifier, _) = ScriptedClassifier::new(&[("STEM Teacher", 1.0)]);
    slot.install(Box::new(classifier)).unwrap();
    assert!(matches!(
        session.live_cycle().unwrap(),
        CycleOutcome::Rendered(_)
    ));
    assert_eq!(surface.snapshot().results_rendered, 1);
    assert!(surface.snapshot().notifications.is_empty());
}

#[test]
fn lost_device_stops_the_loop() {
    let media = SyntheticMedia::phone().unplug_after(5);
    let tracks = media.track_log();
    let (slot, _) = passing_classifier();
    let (mut session, surface) = new_session(media, slot);
    session.start_camera().unwrap();

    let stats = scheduler::run(&mut session, &mut || {});

    assert!(stats.stream_lost);
    // one frame went to the start-up check
    assert_eq!(stats.rendered, 4);
    assert_eq!(session.camera_state(), CameraState::Stopped);
    assert_eq!(tracks.live_count(), 0);
    assert!(!session.has_live_stream());

    let snap = surface.snapshot();
    assert_eq!(snap.notifications, vec!["camera stream lost"]);
    assert!(snap.affordances.unwrap().start_enabled);
}

#[test]
fn external_unplug_is_detected() {
    let media = SyntheticMedia::phone();
    let tracks = media.track_log();
    let (mut session, _) = new_session(media, ClassifierSlot::empty());
    session.start_camera().unwrap();

    tracks.unplug_all();
    assert_eq!(session.live_cycle().unwrap(), CycleOutcome::StreamLost);
    assert_eq!(session.camera_state(), CameraState::Stopped);
}

#[test]
fn stop_from_another_thread_ends_the_loop() {
    let media = SyntheticMedia::phone();
    let tracks = media.track_log();
    let (slot, _) = passing_classifier();
    let (mut session, _) = new_session(media, slot);
    session.start_camera().unwrap();

    let controller = session.controller();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        controller.request_stop().unwrap();
    });

    let mut pacer = IntervalPacer::from_fps(200);
    let stats = scheduler::run(&mut session, &mut pacer);
    stopper.join().unwrap();

    assert!(stats.rendered >= 1);
    assert!(!stats.stream_lost);
    assert_eq!(session.camera_state(), CameraState::Stopped);
    assert_eq!(tracks.live_count(), 0);

    // the loop does not restart by itself
    assert_eq!(session.capture_stats().streams_started, 1);
}
