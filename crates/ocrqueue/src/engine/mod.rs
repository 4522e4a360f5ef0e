//! OCR engine trait.
//!
//! The queue treats an engine as an opaque, synchronous and possibly slow
//! function from an image file to an [`OcrResult`]. Engines are called from
//! blocking worker threads, never on the async executor.

pub mod tesseract;
pub mod tsv;

use crate::Result;
use crate::types::{EngineId, OcrParams, OcrResult};
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub use tesseract::TesseractCommandEngine;

/// Trait for OCR engines driven by the queue.
///
/// # Thread Safety
///
/// Engines must be `Send + Sync`. The queue may call `process_image` from
/// several worker threads at once for distinct images, but never twice
/// concurrently for the same request.
///
/// # Example
///
/// ```rust
/// use ocrqueue::engine::OcrEngine;
/// use ocrqueue::{BoundingBox, OcrParams, OcrResult, Result};
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// struct BlankEngine;
///
/// impl OcrEngine for BlankEngine {
///     fn name(&self) -> &str { "blank" }
///     fn version(&self) -> String { "1.0.0".to_string() }
///
///     fn process_image(
///         &self,
///         _path: &Path,
///         _params: &OcrParams,
///         cancel: &CancellationToken,
///     ) -> Result<Option<OcrResult>> {
///         if cancel.is_cancelled() {
///             return Ok(None);
///         }
///         Ok(Some(OcrResult::new(BoundingBox::new(0, 0, 1, 1), vec![], false)))
///     }
/// }
/// ```
pub trait OcrEngine: Send + Sync {
    /// Stable engine name, e.g. "tesseract".
    fn name(&self) -> &str;

    /// Engine version. Results from different versions are cached separately.
    fn version(&self) -> String;

    /// Run OCR over the image at `path`.
    ///
    /// `cancel` belongs to the request, not to any individual caller: it only
    /// fires once every caller interested in this image has gone away.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(result))` - recognised text
    /// - `Ok(None)` - cancelled or nothing usable; the request will be retried next time
    ///
    /// # Errors
    ///
    /// Any error is logged by the queue and treated like `Ok(None)`.
    fn process_image(&self, path: &Path, params: &OcrParams, cancel: &CancellationToken) -> Result<Option<OcrResult>>;

    /// Identity used as part of the request key.
    fn engine_id(&self) -> EngineId {
        EngineId {
            name: self.name().to_string(),
            version: self.version(),
        }
    }
}
