//! Progress display that reports OCR operations through tracing.

use ocrqueue::{OcrOperation, OperationProgress};
use std::sync::Arc;

/// Logs operation start, each counter change, and completion.
pub struct TracingProgress;

impl OperationProgress for TracingProgress {
    fn show_background_progress(&self, operation: &Arc<OcrOperation>) {
        tracing::info!(operation = %operation.id(), "{}", operation.title());

        let mut updates = operation.subscribe();
        let id = operation.id();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let status = *updates.borrow_and_update();
                tracing::debug!(
                    operation = %id,
                    current = status.current_progress,
                    max = status.max_progress,
                    "OCR progress"
                );
                if status.finished {
                    break;
                }
            }
        });
    }

    fn operation_finished(&self, operation: &Arc<OcrOperation>) {
        let status = operation.status();
        tracing::info!(
            operation = %operation.id(),
            images = status.max_progress,
            "OCR finished"
        );
    }
}
