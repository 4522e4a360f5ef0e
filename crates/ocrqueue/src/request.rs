//! Request identity and per-request bookkeeping.
//!
//! A [`Request`] is one unit of OCR work shared by every caller that asked for
//! the same image, engine and parameters. Its mutable fields are only touched
//! while the owning [`RequestStore`](crate::store::RequestStore) lock is held.

use crate::engine::OcrEngine;
use crate::types::{EngineId, ImageId, OcrParams, OcrPriority, OcrResult};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Identity of a logical unit of OCR work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub image: ImageId,
    pub engine: EngineId,
    pub params: OcrParams,
}

impl RequestKey {
    pub fn new(image: ImageId, engine: EngineId, params: OcrParams) -> Self {
        Self { image, engine, params }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {} ({})", self.image, self.engine, self.params.language_code)
    }
}

/// Generation number distinguishing successive requests for the same key.
///
/// A key can be evicted and recreated while callers of the old request are
/// still waking up; they must not touch the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

/// Number of currently waiting callers per priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityRefCount {
    foreground: usize,
    background: usize,
}

impl PriorityRefCount {
    pub fn get(&self, priority: OcrPriority) -> usize {
        match priority {
            OcrPriority::Foreground => self.foreground,
            OcrPriority::Background => self.background,
        }
    }

    pub fn increment(&mut self, priority: OcrPriority) {
        *self.slot(priority) += 1;
    }

    pub fn decrement(&mut self, priority: OcrPriority) {
        let slot = self.slot(priority);
        debug_assert!(*slot > 0, "priority ref count underflow");
        *slot = slot.saturating_sub(1);
    }

    pub fn total(&self) -> usize {
        self.foreground + self.background
    }

    pub fn is_live(&self) -> bool {
        self.total() > 0
    }

    fn slot(&mut self, priority: OcrPriority) -> &mut usize {
        match priority {
            OcrPriority::Foreground => &mut self.foreground,
            OcrPriority::Background => &mut self.background,
        }
    }
}

/// Mutable record for one [`RequestKey`].
pub(crate) struct Request {
    pub(crate) id: RequestId,
    pub(crate) engine: Arc<dyn OcrEngine>,
    /// Donated by the first caller; taken by whoever deletes it
    pub(crate) temp_image: Option<PathBuf>,
    pub(crate) refs: PriorityRefCount,
    pub(crate) processing: bool,
    /// Set at most once, never cleared
    pub(crate) result: Option<Arc<OcrResult>>,
    completion: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Request {
    pub(crate) fn new(id: RequestId, engine: Arc<dyn OcrEngine>) -> Self {
        let (completion, _) = watch::channel(false);
        Self {
            id,
            engine,
            temp_image: None,
            refs: PriorityRefCount::default(),
            processing: false,
            result: None,
            completion,
            cancel: CancellationToken::new(),
        }
    }

    /// Waiting for work, not claimed by a worker, and holding an image to read.
    pub(crate) fn is_dispatchable(&self) -> bool {
        self.refs.is_live() && !self.processing && self.result.is_none() && self.temp_image.is_some()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.completion.subscribe()
    }

    /// Fire the one-shot completion signal.
    pub(crate) fn signal_completion(&self) {
        self.completion.send_replace(true);
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// A caller's registered interest in a request.
///
/// Dropping the store entry drops the completion sender, which also wakes the
/// ticket holder.
#[derive(Debug)]
pub(crate) struct RequestTicket {
    pub(crate) key: RequestKey,
    pub(crate) id: RequestId,
    pub(crate) priority: OcrPriority,
    pub(crate) completion: watch::Receiver<bool>,
}

impl RequestTicket {
    /// Resolve once the request completes or is torn down.
    pub(crate) async fn completed(&mut self) {
        // An Err means the sender was dropped: the request is gone, which also ends the wait.
        let _ = self.completion.wait_for(|done| *done).await;
    }
}

/// What a worker takes away from the store when it claims a request.
pub(crate) struct Checkout {
    pub(crate) key: RequestKey,
    pub(crate) id: RequestId,
    pub(crate) engine: Arc<dyn OcrEngine>,
    pub(crate) temp_image: PathBuf,
    pub(crate) cancel: CancellationToken,
}
