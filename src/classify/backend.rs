use anyhow::Result;

use super::prediction::ClassScore;

/// Classifier backend trait.
///
/// The classifier is an opaque service: pixels in, one score per known class
/// out, in the backend's own class-enumeration order. Sorting and label
/// matching happen in the adapter, never in the backend.
pub trait ClassifierBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class labels in enumeration order.
    fn labels(&self) -> &[String];

    /// Score an RGBA frame.
    ///
    /// `flip_horizontal` asks the backend to mirror the input before inference.
    /// The adapter always passes `false`; orientation is decided by whoever
    /// composited the buffer.
    fn predict(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        flip_horizontal: bool,
    ) -> Result<Vec<ClassScore>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
