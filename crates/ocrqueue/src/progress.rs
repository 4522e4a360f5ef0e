//! Progress aggregation across overlapping OCR requests.
//!
//! Every waiting caller counts as one unit of work. Units that overlap in time
//! share a single [`OcrOperation`], so a burst of OCR activity shows up as one
//! progress report instead of one per image.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const OPERATION_TITLE: &str = "Running OCR";

/// Snapshot of an operation's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStatus {
    pub current_progress: usize,
    pub max_progress: usize,
    pub finished: bool,
}

/// One batch of overlapping OCR work as seen by a progress display.
///
/// Counters only increase over the lifetime of an operation.
#[derive(Debug)]
pub struct OcrOperation {
    id: Uuid,
    title: String,
    status: watch::Sender<OperationStatus>,
    cancel: CancellationToken,
}

impl OcrOperation {
    fn new() -> Self {
        let (status, _) = watch::channel(OperationStatus::default());
        Self {
            id: Uuid::new_v4(),
            title: OPERATION_TITLE.to_string(),
            status,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn status(&self) -> OperationStatus {
        *self.status.borrow()
    }

    /// Observe every status change.
    pub fn subscribe(&self) -> watch::Receiver<OperationStatus> {
        self.status.subscribe()
    }

    /// Cancel every caller counted in this operation.
    ///
    /// Each caller's wait ends as if its own token had fired.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Display side of progress reporting.
///
/// Implementations should return quickly; they are called on the enqueueing
/// task.
pub trait OperationProgress: Send + Sync {
    /// A new operation started. Poll or [`subscribe`](OcrOperation::subscribe) for counters.
    fn show_background_progress(&self, operation: &Arc<OcrOperation>);

    /// The operation's last unit of work finished.
    fn operation_finished(&self, operation: &Arc<OcrOperation>);
}

/// Progress display that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl OperationProgress for NoopProgress {
    fn show_background_progress(&self, _operation: &Arc<OcrOperation>) {}

    fn operation_finished(&self, _operation: &Arc<OcrOperation>) {}
}

/// Groups units of work into operations and reports them to a display.
pub(crate) struct ProgressAggregator {
    current: Mutex<Option<Arc<OcrOperation>>>,
    display: Arc<dyn OperationProgress>,
}

impl ProgressAggregator {
    pub(crate) fn new(display: Arc<dyn OperationProgress>) -> Self {
        Self {
            current: Mutex::new(None),
            display,
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<OcrOperation>> {
        self.current.lock().clone()
    }

    /// Count one more unit of work, returning the operation it belongs to.
    pub(crate) fn starting_one(&self) -> Arc<OcrOperation> {
        let (operation, created) = {
            let mut current = self.current.lock();
            let created = current.is_none();
            let operation = Arc::clone(current.get_or_insert_with(|| Arc::new(OcrOperation::new())));
            operation.status.send_modify(|status| status.max_progress += 1);
            (operation, created)
        };

        if created {
            tracing::debug!(operation = %operation.id, "Started OCR operation");
            self.display.show_background_progress(&operation);
        }
        operation
    }

    /// Count one unit of `operation` as done, closing it if it was the last.
    pub(crate) fn finished_one(&self, operation: &Arc<OcrOperation>) {
        let closed = {
            let mut current = self.current.lock();
            let mut closed = false;
            operation.status.send_modify(|status| {
                status.current_progress += 1;
                if status.current_progress >= status.max_progress && !status.finished {
                    status.finished = true;
                    closed = true;
                }
            });
            if closed && current.as_ref().is_some_and(|active| Arc::ptr_eq(active, operation)) {
                *current = None;
            }
            closed
        };

        if closed {
            let status = operation.status();
            tracing::debug!(
                operation = %operation.id,
                units = status.max_progress,
                "Finished OCR operation"
            );
            self.display.operation_finished(operation);
        }
    }
}
