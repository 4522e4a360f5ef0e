//! Shared helpers for queue integration tests.

#![allow(dead_code)]

use ocrqueue::{
    BoundingBox, ImageId, OcrEngine, OcrOperation, OcrParams, OcrPriority, OcrQueueError, OcrRequestQueue, OcrResult,
    OcrResultElement, OperationProgress, QueueConfig, Result,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const GATE_POLL: Duration = Duration::from_millis(5);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Scripted engine. Invocations block at a gate until the test opens it,
/// returning early with `Ok(None)` if their request is cancelled meanwhile.
///
/// The recognised text is the content of the image file.
pub struct MockEngine {
    name: String,
    version: String,
    gate_open: AtomicBool,
    invocations: AtomicUsize,
    cancelled: AtomicUsize,
    fail_next: AtomicUsize,
    panic_next: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Self::with_version("1.0")
    }

    pub fn with_version(version: &str) -> Arc<Self> {
        Arc::new(Self {
            name: "mock".to_string(),
            version: version.to_string(),
            gate_open: AtomicBool::new(true),
            invocations: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            panic_next: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        })
    }

    /// Same engine as `self` but held as a trait object.
    pub fn as_dyn(self: &Arc<Self>) -> Arc<dyn OcrEngine> {
        Arc::clone(self) as Arc<dyn OcrEngine>
    }

    pub fn close_gate(&self) {
        self.gate_open.store(false, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.gate_open.store(true, Ordering::SeqCst);
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn panic_next(&self, count: usize) {
        self.panic_next.store(count, Ordering::SeqCst);
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Invocations that gave up because their request was cancelled.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Image file stems in the order the engine started on them.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl OcrEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn process_image(&self, path: &Path, params: &OcrParams, cancel: &CancellationToken) -> Result<Option<OcrResult>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.started.lock().push(stem);

        let text = std::fs::read_to_string(path)?;

        while !self.gate_open.load(Ordering::SeqCst) {
            if cancel.is_cancelled() {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                return Ok(None);
            }
            std::thread::sleep(GATE_POLL);
        }

        if Self::take_one(&self.panic_next) {
            panic!("scripted engine panic");
        }
        if Self::take_one(&self.fail_next) {
            return Err(OcrQueueError::ocr("scripted engine failure"));
        }

        Ok(Some(text_result(&text, &params.language_code)))
    }
}

/// One word per whitespace-separated token, all on line 0.
pub fn text_result(text: &str, language_code: &str) -> OcrResult {
    let elements = text
        .split_whitespace()
        .enumerate()
        .map(|(index, word)| OcrResultElement {
            text: word.to_string(),
            language_code: language_code.to_string(),
            right_to_left: false,
            bounds: BoundingBox::new(index as i32 * 10, 0, 10, 10),
            confidence: 95.0,
            line: 0,
        })
        .collect();
    OcrResult::new(BoundingBox::new(0, 0, 100, 10), elements, false)
}

/// Progress display recording what it was told.
#[derive(Default)]
pub struct RecordingProgress {
    pub shown: Mutex<Vec<Arc<OcrOperation>>>,
    pub finished: Mutex<Vec<Arc<OcrOperation>>>,
}

impl OperationProgress for RecordingProgress {
    fn show_background_progress(&self, operation: &Arc<OcrOperation>) {
        self.shown.lock().push(Arc::clone(operation));
    }

    fn operation_finished(&self, operation: &Arc<OcrOperation>) {
        self.finished.lock().push(Arc::clone(operation));
    }
}

/// Route queue logs to the test output. Filtered by `RUST_LOG`, `warn` by default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn queue_with_workers(workers: usize) -> OcrRequestQueue {
    queue_with_progress(workers, Arc::new(ocrqueue::NoopProgress))
}

pub fn queue_with_progress(workers: usize, progress: Arc<dyn OperationProgress>) -> OcrRequestQueue {
    queue_with_config(
        QueueConfig {
            worker_count: Some(workers),
            cleanup_retry_delay_ms: 10,
        },
        progress,
    )
}

pub fn queue_with_config(config: QueueConfig, progress: Arc<dyn OperationProgress>) -> OcrRequestQueue {
    init_tracing();
    OcrRequestQueue::with_config(config, progress).expect("valid config")
}

/// Write a temp image whose "recognised text" is `content`.
pub fn write_image(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(format!("{name}.png"));
    std::fs::write(&path, content).expect("write temp image");
    path
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let reached = tokio::time::timeout(WAIT_LIMIT, async {
        while !condition() {
            tokio::time::sleep(GATE_POLL).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting until {what}");
}

/// Run one `enqueue` call on its own task with default params.
pub fn spawn_enqueue(
    queue: &OcrRequestQueue,
    engine: &Arc<MockEngine>,
    image: &str,
    temp_image: PathBuf,
    priority: OcrPriority,
    cancel: &CancellationToken,
) -> JoinHandle<Option<Arc<OcrResult>>> {
    let queue = queue.clone();
    let engine = engine.as_dyn();
    let image = ImageId::new(image);
    let cancel = cancel.clone();
    tokio::spawn(async move {
        queue
            .enqueue(engine, &image, temp_image, &OcrParams::default(), priority, &cancel)
            .await
    })
}

/// Await a task, failing the test instead of hanging.
pub async fn join<T>(handle: JoinHandle<T>) -> T {
    tokio::time::timeout(WAIT_LIMIT, handle)
        .await
        .expect("task did not finish in time")
        .expect("task panicked")
}
