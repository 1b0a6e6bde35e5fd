//! Classification adapter.
//!
//! Wraps the external classifier behind `ClassifierBackend`, holds it in a
//! shareable `ClassifierSlot` while it loads, and turns raw per-class scores
//! into a sorted `Prediction`.

mod backend;
mod backends;
mod prediction;
mod slot;

pub use backend::ClassifierBackend;
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::{ModelMetadata, TractClassifier};
pub use prediction::{ClassScore, Prediction};
pub use slot::{ClassifierSlot, LoadStatus};
