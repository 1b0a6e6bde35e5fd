use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::error::{PipelineError, PipelineResult};
use crate::frame::RasterBuffer;

use super::backend::ClassifierBackend;
use super::prediction::Prediction;

/// Orientation is the compositor's job; the classifier never flips again.
const CLASSIFIER_FLIP: bool = false;

/// Load status as seen by the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Empty,
    Loading,
    Ready,
    Failed(String),
}

enum SlotState {
    Empty,
    Loading,
    Ready(Box<dyn ClassifierBackend>),
    Failed(String),
}

/// Shared handle to the (possibly not yet loaded) classifier.
///
/// The backend sits behind `Mutex` because `predict` takes `&mut self` and the
/// loader may finish on another thread.
#[derive(Clone)]
pub struct ClassifierSlot {
    state: Arc<Mutex<SlotState>>,
}

impl ClassifierSlot {
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::Empty)),
        }
    }

    pub fn with_backend<B: ClassifierBackend + 'static>(backend: B) -> Self {
        let slot = Self::empty();
        // freshly created, cannot be poisoned
        if let Ok(mut guard) = slot.state.lock() {
            *guard = SlotState::Ready(Box::new(backend));
        }
        slot
    }

    fn lock(&self) -> Result<MutexGuard<'_, SlotState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("classifier slot lock poisoned"))
    }

    /// Install a loaded backend, replacing whatever was there.
    pub fn install(&self, backend: Box<dyn ClassifierBackend>) -> Result<()> {
        log::info!("ClassifierSlot: backend '{}' ready", backend.name());
        *self.lock()? = SlotState::Ready(backend);
        Ok(())
    }

    pub fn status(&self) -> LoadStatus {
        match self.lock() {
            Ok(guard) => match &*guard {
                SlotState::Empty => LoadStatus::Empty,
                SlotState::Loading => LoadStatus::Loading,
                SlotState::Ready(_) => LoadStatus::Ready,
                SlotState::Failed(reason) => LoadStatus::Failed(reason.clone()),
            },
            Err(err) => LoadStatus::Failed(err.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == LoadStatus::Ready
    }

    /// Run `loader` on a background thread and install its result.
    ///
    /// A failed load, or a loader thread that cannot be started, leaves the
    /// slot in `Failed`; frames keep being skipped as `ClassifierUnavailable`.
    pub fn load_in_background<F>(&self, loader: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() -> Result<Box<dyn ClassifierBackend>> + Send + 'static,
    {
        self.load_with(loader, |job| {
            std::thread::Builder::new()
                .name("classifier-load".to_string())
                .spawn(job)
        })
    }

    fn load_with<F, S>(&self, loader: F, spawn: S) -> Result<JoinHandle<()>>
    where
        F: FnOnce() -> Result<Box<dyn ClassifierBackend>> + Send + 'static,
        S: FnOnce(Box<dyn FnOnce() + Send>) -> std::io::Result<JoinHandle<()>>,
    {
        *self.lock()? = SlotState::Loading;
        let state = Arc::clone(&self.state);
        let job: Box<dyn FnOnce() + Send> = Box::new(move || {
            let next = match loader().and_then(|mut backend| {
                backend.warm_up()?;
                Ok(backend)
            }) {
                Ok(backend) => {
                    log::info!("ClassifierSlot: backend '{}' loaded", backend.name());
                    SlotState::Ready(backend)
                }
                Err(err) => {
                    log::error!("ClassifierSlot: failed to load model: {:#}", err);
                    SlotState::Failed(format!("{:#}", err))
                }
            };
            match state.lock() {
                Ok(mut guard) => *guard = next,
                Err(_) => log::error!("ClassifierSlot: lock poisoned while installing backend"),
            }
        });
        match spawn(job) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                log::error!("ClassifierSlot: failed to start loader thread: {}", err);
                *self.lock()? = SlotState::Failed(format!("failed to start loader thread: {}", err));
                Err(err.into())
            }
        }
    }

    /// Block until the slot leaves `Loading` or `timeout` elapses.
    pub fn wait_until_settled(&self, timeout: Duration) -> LoadStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status();
            if status != LoadStatus::Loading || Instant::now() >= deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Classify the raster buffer and return a freshly sorted prediction.
    pub fn classify(&self, buffer: &RasterBuffer) -> PipelineResult<Prediction> {
        let mut guard = self.lock()?;
        let SlotState::Ready(backend) = &mut *guard else {
            return Err(PipelineError::ClassifierUnavailable);
        };
        let scores = buffer
            .inference_view()
            .run_classifier(backend.as_mut(), CLASSIFIER_FLIP)?;
        Ok(Prediction::from_scores(scores))
    }
}

impl Default for ClassifierSlot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassScore;

    struct FixedBackend {
        labels: Vec<String>,
        seen_flip: Arc<Mutex<Vec<bool>>>,
    }

    impl ClassifierBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn predict(
            &mut self,
            _pixels: &[u8],
            _width: u32,
            _height: u32,
            flip_horizontal: bool,
        ) -> Result<Vec<ClassScore>> {
            self.seen_flip.lock().unwrap().push(flip_horizontal);
            Ok(vec![
                ClassScore::new("low", 0.2),
                ClassScore::new("high", 0.8),
            ])
        }
    }

    fn fixed() -> (FixedBackend, Arc<Mutex<Vec<bool>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            FixedBackend {
                labels: vec!["low".into(), "high".into()],
                seen_flip: Arc::clone(&seen),
            },
            seen,
        )
    }

    #[test]
    fn empty_slot_is_unavailable() {
        let slot = ClassifierSlot::empty();
        let buffer = RasterBuffer::new(4, 4).unwrap();
        assert!(matches!(
            slot.classify(&buffer),
            Err(PipelineError::ClassifierUnavailable)
        ));
    }

    #[test]
    fn classify_sorts_and_never_flips() {
        let (backend, seen) = fixed();
        let slot = ClassifierSlot::with_backend(backend);
        let buffer = RasterBuffer::new(4, 4).unwrap();

        let prediction = slot.classify(&buffer).unwrap();
        assert_eq!(prediction.top().unwrap().label, "high");
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[test]
    fn background_load_installs_backend() {
        let slot = ClassifierSlot::empty();
        let handle = slot
            .load_in_background(|| {
                let (backend, _) = fixed();
                Ok(Box::new(backend) as Box<dyn ClassifierBackend>)
            })
            .unwrap();
        handle.join().unwrap();
        assert_eq!(slot.status(), LoadStatus::Ready);
    }

    #[test]
    fn background_load_failure_is_recorded() {
        let slot = ClassifierSlot::empty();
        let handle = slot
            .load_in_background(|| Err(anyhow!("model.json not found")))
            .unwrap();
        handle.join().unwrap();
        match slot.wait_until_settled(Duration::from_millis(10)) {
            LoadStatus::Failed(reason) => assert!(reason.contains("model.json")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn loader_thread_spawn_failure_settles_the_slot() {
        let slot = ClassifierSlot::empty();
        let result = slot.load_with(
            || Err(anyhow!("never runs")),
            |_job| {
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "thread limit reached",
                ))
            },
        );
        assert!(result.is_err());
        match slot.wait_until_settled(Duration::from_secs(5)) {
            LoadStatus::Failed(reason) => assert!(reason.contains("thread limit reached")),
            other => panic!("unexpected status {:?}", other),
        }
    }
}
