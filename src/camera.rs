//! Camera lifecycle controller.
//!
//! One enumerated `CameraState` and one transition function. Button enablement
//! is derived from the state, never stored next to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraState {
    Idle,
    Requesting,
    Active,
    Stopped,
    Failed,
}

/// Inputs to the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraEvent {
    /// User asked to start the camera.
    Start,
    /// A stream was obtained and the first frame arrived.
    StreamReady,
    /// Enumeration or acquisition failed.
    AcquisitionFailed,
    /// The failure was shown to the user.
    ErrorAcknowledged,
    /// User asked to stop the camera.
    Stop,
    /// Tracks ended outside our control.
    StreamLost,
}

/// Which controls the UI should offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Affordances {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl CameraState {
    /// Next state for `event`, or `None` when the event does not apply.
    pub fn transition(self, event: CameraEvent) -> Option<CameraState> {
        use CameraEvent as E;
        use CameraState as S;
        match (self, event) {
            (S::Idle | S::Stopped, E::Start) => Some(S::Requesting),
            (S::Requesting, E::StreamReady) => Some(S::Active),
            (S::Requesting, E::AcquisitionFailed) => Some(S::Failed),
            (S::Failed, E::ErrorAcknowledged) => Some(S::Idle),
            (S::Active, E::Stop | E::StreamLost) => Some(S::Stopped),
            _ => None,
        }
    }

    pub fn affordances(self) -> Affordances {
        match self {
            CameraState::Idle | CameraState::Stopped => Affordances {
                start_enabled: true,
                stop_enabled: false,
            },
            CameraState::Active => Affordances {
                start_enabled: false,
                stop_enabled: true,
            },
            CameraState::Requesting | CameraState::Failed => Affordances {
                start_enabled: false,
                stop_enabled: false,
            },
        }
    }

    pub fn is_active(self) -> bool {
        self == CameraState::Active
    }
}

/// Shared handle to the camera state.
///
/// Cloning shares the state, so a Ctrl-C handler or UI thread can request a
/// stop while the render loop owns the session. A stop requested while the
/// camera is still Requesting is held until the session reaches Active.
#[derive(Clone, Debug)]
pub struct CameraController {
    state: Arc<Mutex<CameraState>>,
    stop_pending: Arc<AtomicBool>,
}

impl CameraController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CameraState::Idle)),
            stop_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> CameraState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn affordances(&self) -> Affordances {
        self.state().affordances()
    }

    /// Apply `event`. Returns the new state, or `None` if it was ignored.
    pub fn apply(&self, event: CameraEvent) -> Result<Option<CameraState>> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow!("camera state lock poisoned"))?;
        let from = *guard;
        match from.transition(event) {
            Some(to) => {
                log::debug!("CameraController: {:?} --{:?}--> {:?}", from, event, to);
                if event == CameraEvent::Start {
                    self.stop_pending.store(false, Ordering::SeqCst);
                }
                *guard = to;
                Ok(Some(to))
            }
            None => {
                log::debug!("CameraController: ignored {:?} in {:?}", event, from);
                Ok(None)
            }
        }
    }

    /// Request a stop. Returns `true` if an Active camera was stopped.
    ///
    /// While Requesting the request is remembered instead; the session picks
    /// it up with `take_pending_stop` once acquisition finishes. In any other
    /// state it is a no-op.
    pub fn request_stop(&self) -> Result<bool> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow!("camera state lock poisoned"))?;
        match *guard {
            CameraState::Active => {
                *guard = CameraState::Stopped;
                log::debug!("CameraController: Active --Stop--> Stopped");
                Ok(true)
            }
            CameraState::Requesting => {
                log::debug!("CameraController: stop deferred until acquisition finishes");
                self.stop_pending.store(true, Ordering::SeqCst);
                Ok(false)
            }
            other => {
                log::debug!("CameraController: ignored stop request in {:?}", other);
                Ok(false)
            }
        }
    }

    /// Consume a stop requested during acquisition.
    pub fn take_pending_stop(&self) -> bool {
        self.stop_pending.swap(false, Ordering::SeqCst)
    }
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}
