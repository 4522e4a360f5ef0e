//! ocrqueue - Deduplicating OCR Request Queue
//!
//! A process-wide broker for OCR work. Many callers may ask for OCR on the same
//! image at the same time; the queue collapses them onto a single engine
//! invocation, schedules work by priority, caches results, and lets each
//! caller walk away independently.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ocrqueue::{ImageId, NoopProgress, OcrParams, OcrPriority, OcrRequestQueue, TesseractCommandEngine};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> ocrqueue::Result<()> {
//! let queue = OcrRequestQueue::new(Arc::new(NoopProgress));
//! let engine = Arc::new(TesseractCommandEngine::new("tesseract")?);
//!
//! let bytes = std::fs::read("page.png")?;
//! std::fs::write("/tmp/page-copy.png", &bytes)?;
//!
//! let result = queue
//!     .enqueue(
//!         engine,
//!         &ImageId::from_content(&bytes),
//!         "/tmp/page-copy.png",
//!         &OcrParams::default(),
//!         OcrPriority::Foreground,
//!         &CancellationToken::new(),
//!     )
//!     .await;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Store** (`store`): every request behind one mutex, keyed by image, engine and params
//! - **Dispatch** (`dispatch`): foreground before background, then oldest first
//! - **Workers** (`worker`): a pool of tokio tasks that exists only while callers wait
//! - **Progress** (`progress`): overlapping requests reported as one operation
//! - **Engines** (`engine`): the `OcrEngine` trait and a tesseract CLI backend
//!
//! # Ownership of temp images
//!
//! Each call to `enqueue` hands a temporary image file to the queue. The queue
//! keeps at most one per request and deletes every other copy, and deletes the
//! kept one once the engine has read it or every caller has gone away.

#![deny(unsafe_code)]

pub mod cleanup;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod progress;
pub mod queue;
pub mod request;
pub mod store;
pub mod types;

mod worker;

pub use config::QueueConfig;
pub use engine::{OcrEngine, TesseractCommandEngine};
pub use error::{OcrQueueError, Result};
pub use progress::{NoopProgress, OcrOperation, OperationProgress, OperationStatus};
pub use queue::OcrRequestQueue;
pub use request::{PriorityRefCount, RequestKey};
pub use types::{BoundingBox, EngineId, ImageId, OcrMode, OcrParams, OcrPriority, OcrResult, OcrResultElement};
