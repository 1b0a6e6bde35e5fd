//! Render loop.
//!
//! One iteration per display frame while the camera is Active. The Active
//! check at the top of each iteration is the only exit; stopping the camera
//! from anywhere (Ctrl-C, a lost device) ends the loop on its next turn.

use std::time::{Duration, Instant};

use crate::session::{CycleOutcome, Session};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Paces the loop to the display rate.
pub trait FramePacer {
    fn wait_for_next_frame(&mut self);
}

/// Sleeps out the rest of each frame interval.
///
/// When a cycle overruns its interval the next one starts immediately; frames
/// are never queued up behind a slow classifier.
#[derive(Debug)]
pub struct IntervalPacer {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl IntervalPacer {
    pub fn from_fps(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
            last_tick: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl FramePacer for IntervalPacer {
    fn wait_for_next_frame(&mut self) {
        if let Some(last) = self.last_tick {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last_tick = Some(Instant::now());
    }
}

impl<F: FnMut()> FramePacer for F {
    fn wait_for_next_frame(&mut self) {
        self()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub rendered: u64,
    pub skipped: u64,
    pub failed: u64,
    pub stream_lost: bool,
}

/// Drive `session` until the camera leaves Active.
///
/// Per-frame errors are logged and the loop carries on with the next frame.
/// The stream is released before returning.
pub fn run(session: &mut Session, pacer: &mut dyn FramePacer) -> LoopStats {
    let controller = session.controller();
    let mut stats = LoopStats::default();
    let mut last_health_log = Instant::now();

    log::info!("RenderLoop: running");
    while controller.is_active() {
        stats.iterations += 1;
        match session.live_cycle() {
            Ok(CycleOutcome::Rendered(verdict)) => {
                stats.rendered += 1;
                log::trace!(
                    "RenderLoop: {}% pass={}",
                    verdict.percentage,
                    verdict.pass
                );
            }
            Ok(CycleOutcome::Skipped) => stats.skipped += 1,
            Ok(CycleOutcome::StreamLost) => {
                stats.stream_lost = true;
                continue;
            }
            Err(err) => {
                stats.failed += 1;
                log::warn!("RenderLoop: frame failed: {}", err);
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log::info!(
                "RenderLoop health: iterations={} rendered={} skipped={} failed={} classifier={:?}",
                stats.iterations,
                stats.rendered,
                stats.skipped,
                stats.failed,
                session.classifier().status()
            );
            last_health_log = Instant::now();
        }

        pacer.wait_for_next_frame();
    }

    session.release_stream();
    log::info!(
        "RenderLoop: stopped in {:?} after {} iterations",
        controller.state(),
        stats.iterations
    );
    stats
}
