//! The public queue surface.
//!
//! `enqueue` registers a caller's interest in a request, makes sure workers
//! are running, and waits for the first of three things: the request
//! completing, the caller's own token, or the token of the progress operation
//! the caller was counted in. Whatever ends the wait, the caller's vote is
//! withdrawn afterwards and the request is garbage collected if nobody else
//! still wants it.

use crate::cleanup::PendingDeletes;
use crate::config::QueueConfig;
use crate::dispatch::WakeSignal;
use crate::engine::OcrEngine;
use crate::progress::{OcrOperation, OperationProgress, ProgressAggregator};
use crate::request::{RequestKey, RequestTicket};
use crate::store::{Admission, RequestStore};
use crate::types::{ImageId, OcrParams, OcrPriority, OcrResult};
use crate::worker::{WorkerContext, WorkerPool};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

struct QueueShared {
    ctx: Arc<WorkerContext>,
    progress: ProgressAggregator,
    worker_count: usize,
}

impl QueueShared {
    fn store(&self) -> &RequestStore {
        &self.ctx.store
    }

    fn cleanup_retry_delay(&self) -> Duration {
        self.ctx.cleanup_retry_delay
    }

    /// Start the pool if callers are waiting, stop it if none are.
    fn ensure_workers(&self) {
        let mut state = self.store().lock();
        let has_live_work = state.has_live_work();

        if has_live_work && state.pool.is_none() {
            match Handle::try_current() {
                Ok(runtime) => {
                    state.pool = Some(WorkerPool::start(&runtime, self.worker_count, &self.ctx));
                }
                Err(_) => {
                    tracing::warn!("No tokio runtime available, OCR workers not started");
                }
            }
        } else if !has_live_work && let Some(pool) = state.pool.take() {
            pool.stop();
        }
    }
}

/// Deduplicating, priority-scheduled OCR work queue.
///
/// Identical requests (same image, engine and parameters) share one engine
/// invocation and one cached result. Foreground callers are served before
/// background callers. Worker tasks only exist while somebody is waiting.
///
/// Cloning is cheap and clones share all state.
///
/// # Example
///
/// ```rust,no_run
/// use ocrqueue::{ImageId, NoopProgress, OcrParams, OcrPriority, OcrRequestQueue, TesseractCommandEngine};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> ocrqueue::Result<()> {
/// let queue = OcrRequestQueue::new(Arc::new(NoopProgress));
/// let engine = Arc::new(TesseractCommandEngine::new("tesseract")?);
/// let image = ImageId::new("page-1");
///
/// let result = queue
///     .enqueue(
///         engine,
///         &image,
///         "/tmp/page-1.png",
///         &OcrParams::default(),
///         OcrPriority::Foreground,
///         &CancellationToken::new(),
///     )
///     .await;
///
/// if let Some(result) = result {
///     println!("{}", result.text());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OcrRequestQueue {
    shared: Arc<QueueShared>,
}

impl OcrRequestQueue {
    /// Create a queue with default configuration.
    pub fn new(progress: Arc<dyn OperationProgress>) -> Self {
        Self::build(QueueConfig::default(), progress)
    }

    /// Create a queue from `config`.
    ///
    /// # Errors
    ///
    /// Returns `OcrQueueError::Validation` if the config is unusable.
    pub fn with_config(config: QueueConfig, progress: Arc<dyn OperationProgress>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, progress))
    }

    fn build(config: QueueConfig, progress: Arc<dyn OperationProgress>) -> Self {
        let ctx = Arc::new(WorkerContext {
            store: Arc::new(RequestStore::new()),
            wake: Arc::new(WakeSignal::new()),
            cleanup_retry_delay: config.cleanup_retry_delay(),
            active: Arc::new(AtomicUsize::new(0)),
        });
        Self {
            shared: Arc::new(QueueShared {
                ctx,
                progress: ProgressAggregator::new(progress),
                worker_count: config.effective_worker_count(),
            }),
        }
    }

    /// Run OCR on `image`, sharing work with identical requests.
    ///
    /// `temp_image_path` is handed over to the queue, which deletes it once it
    /// is no longer needed. The caller must not touch it afterwards.
    ///
    /// Returns `None` when the wait was cancelled (by `cancel` or by the
    /// progress operation) or when the engine produced no result. Another
    /// caller's cancellation never affects this call. Dropping the returned
    /// future counts as cancellation.
    pub async fn enqueue(
        &self,
        engine: Arc<dyn OcrEngine>,
        image: &ImageId,
        temp_image_path: impl Into<PathBuf>,
        params: &OcrParams,
        priority: OcrPriority,
        cancel: &CancellationToken,
    ) -> Option<Arc<OcrResult>> {
        let temp_image = temp_image_path.into();
        let key = RequestKey::new(image.clone(), engine.engine_id(), params.clone());
        tracing::debug!(request = %key, ?priority, "Enqueueing OCR request");

        let admission = self.shared.store().admit(
            key,
            &engine,
            temp_image.clone(),
            priority,
            &self.shared.ctx.wake,
        );
        let (ticket, donated) = match admission {
            Admission::Cached(result) => {
                tracing::debug!(image = %image, "OCR result served from cache");
                let mut pending = PendingDeletes::new(self.shared.cleanup_retry_delay());
                pending.push(temp_image);
                pending.flush().await;
                return Some(result);
            }
            Admission::Joined { ticket, donated } => (ticket, donated),
        };

        self.shared.ensure_workers();
        let operation = self.shared.progress.starting_one();
        let mut registration = Registration {
            shared: Arc::clone(&self.shared),
            ticket,
            operation,
            departed: false,
            pending_delete: PendingDeletes::new(self.shared.cleanup_retry_delay()),
        };

        if !donated {
            tracing::debug!(image = %image, "Joined in-flight OCR request");
            registration.pending_delete.push(temp_image);
            registration.pending_delete.flush().await;
        }

        let operation_cancel = registration.operation.cancel_token();
        tokio::select! {
            _ = registration.ticket.completed() => {}
            _ = cancel.cancelled() => {
                tracing::debug!(image = %image, "OCR wait cancelled by caller");
            }
            _ = operation_cancel.cancelled() => {
                tracing::debug!(image = %image, "OCR wait cancelled with its operation");
            }
        }

        registration.finish().await
    }

    /// True if a finished result for this image, engine and params is cached.
    pub fn has_cached_result(&self, engine: &dyn OcrEngine, image: &ImageId, params: &OcrParams) -> bool {
        let key = RequestKey::new(image.clone(), engine.engine_id(), params.clone());
        self.shared.store().has_cached_result(&key)
    }

    /// Whether a worker pool is currently started.
    pub fn is_running(&self) -> bool {
        self.shared.store().lock().pool.is_some()
    }

    /// Workers started per pool.
    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Worker tasks that have not exited yet.
    ///
    /// Lags behind [`is_running`](Self::is_running): a stopped pool's workers
    /// finish their current request first.
    pub fn running_workers(&self) -> usize {
        self.shared.ctx.active.load(Ordering::SeqCst)
    }

    /// Requests with at least one waiting caller.
    pub fn pending_count(&self) -> usize {
        self.shared.store().pending_count()
    }

    /// Requests holding a cached result.
    pub fn cached_count(&self) -> usize {
        self.shared.store().cached_count()
    }

    /// The progress operation currently collecting work, if any.
    pub fn current_operation(&self) -> Option<Arc<OcrOperation>> {
        self.shared.progress.current()
    }
}

impl std::fmt::Debug for OcrRequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrRequestQueue")
            .field("worker_count", &self.shared.worker_count)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// A caller's vote for a request, withdrawn exactly once.
///
/// Dropping it without [`finish`](Self::finish) withdraws the vote; files it
/// still owes deletion of go to a detached task when `pending_delete` drops.
struct Registration {
    shared: Arc<QueueShared>,
    ticket: RequestTicket,
    operation: Arc<OcrOperation>,
    departed: bool,
    pending_delete: PendingDeletes,
}

impl Registration {
    fn depart(&mut self) -> Option<Arc<OcrResult>> {
        if self.departed {
            return None;
        }
        self.departed = true;

        let departure = self.shared.store().depart(&self.ticket);
        self.pending_delete.extend(departure.doomed);
        self.shared.progress.finished_one(&self.operation);
        self.shared.ensure_workers();
        departure.result
    }

    async fn finish(mut self) -> Option<Arc<OcrResult>> {
        let result = self.depart();
        self.pending_delete.flush().await;
        result
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.depart();
    }
}
