//! Worker pool that drains the request store.
//!
//! A pool is started when work arrives and stopped once no caller is waiting.
//! Both transitions happen under the store lock. Stopping only signals the
//! workers; a worker in the middle of an engine call finishes that call,
//! records its outcome and deletes its temp image before exiting.

use crate::cleanup;
use crate::dispatch::WakeSignal;
use crate::request::Checkout;
use crate::store::RequestStore;
use crate::types::OcrResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State shared by every worker of every pool of one queue.
pub(crate) struct WorkerContext {
    pub(crate) store: Arc<RequestStore>,
    pub(crate) wake: Arc<WakeSignal>,
    pub(crate) cleanup_retry_delay: Duration,
    /// Worker tasks that have not yet exited, across pools
    pub(crate) active: Arc<AtomicUsize>,
}

/// Keeps [`WorkerContext::active`] accurate even if a task is dropped unpolled.
struct ActiveWorker(Arc<AtomicUsize>);

impl ActiveWorker {
    fn register(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One generation of worker tasks.
pub(crate) struct WorkerPool {
    stop: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers on `runtime`.
    pub(crate) fn start(runtime: &Handle, count: usize, ctx: &Arc<WorkerContext>) -> Self {
        let stop = CancellationToken::new();
        let handles = (0..count)
            .map(|index| {
                let guard = ActiveWorker::register(&ctx.active);
                let ctx = Arc::clone(ctx);
                let stop = stop.clone();
                runtime.spawn(async move {
                    let _guard = guard;
                    run_worker(index, ctx, stop).await;
                })
            })
            .collect();

        tracing::debug!(workers = count, "Started OCR worker pool");
        Self { stop, handles }
    }

    /// Signal every worker to exit once it is idle.
    pub(crate) fn stop(self) {
        self.stop.cancel();
        tracing::debug!(workers = self.handles.len(), "Stopping OCR worker pool");
    }
}

async fn run_worker(index: usize, ctx: Arc<WorkerContext>, stop: CancellationToken) {
    tracing::trace!(worker = index, "OCR worker started");
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ctx.wake.wait() => {}
        }
        if stop.is_cancelled() {
            // The wake-up belongs to the next pool.
            ctx.wake.notify();
            break;
        }

        let Some(checkout) = ctx.store.checkout_next() else {
            continue;
        };
        process(&ctx, checkout).await;
    }
    tracing::trace!(worker = index, "OCR worker exited");
}

async fn process(ctx: &WorkerContext, checkout: Checkout) {
    let started = Instant::now();
    let result = run_engine(&checkout).await;
    tracing::debug!(
        request = %checkout.key,
        success = result.is_some(),
        elapsed_ms = elapsed_ms(started.elapsed()),
        "OCR request processed"
    );

    ctx.store.complete(&checkout, result);
    cleanup::delete_temp_file(&checkout.temp_image, ctx.cleanup_retry_delay).await;
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Run the engine off the async threads. Failures and panics become `None`.
async fn run_engine(checkout: &Checkout) -> Option<OcrResult> {
    let engine = Arc::clone(&checkout.engine);
    let path = checkout.temp_image.clone();
    let params = checkout.key.params.clone();
    let cancel = checkout.cancel.clone();

    let outcome = tokio::task::spawn_blocking(move || engine.process_image(&path, &params, &cancel)).await;

    match outcome {
        Ok(Ok(Some(result))) => Some(result),
        Ok(Ok(None)) => {
            tracing::debug!(request = %checkout.key, "OCR produced no result");
            None
        }
        Ok(Err(e)) => {
            tracing::warn!(request = %checkout.key, "OCR engine failed: {}", e);
            None
        }
        Err(e) => {
            tracing::error!(request = %checkout.key, "OCR engine task panicked: {}", e);
            None
        }
    }
}
