//! The request store: single source of truth for all OCR requests.
//!
//! One `parking_lot::Mutex` guards the request map, every request's ref counts
//! and processing flag, and the worker pool slot. Nothing here blocks on I/O
//! or on the engine; file deletions are decided under the lock and carried out
//! by the caller after it is released.

use crate::dispatch::{self, Candidate, WakeSignal};
use crate::engine::OcrEngine;
use crate::request::{Checkout, Request, RequestId, RequestKey, RequestTicket};
use crate::types::{OcrPriority, OcrResult};
use crate::worker::WorkerPool;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Outcome of registering a caller.
pub(crate) enum Admission {
    /// Result already cached; the caller's temp file is redundant.
    Cached(Arc<OcrResult>),
    /// Caller is now counted as waiting.
    Joined {
        ticket: RequestTicket,
        /// False when the request already owned an image and the caller's copy is redundant
        donated: bool,
    },
}

/// Outcome of a caller leaving.
#[derive(Debug, Default)]
pub(crate) struct Departure {
    pub(crate) result: Option<Arc<OcrResult>>,
    /// Temp image the departing caller must delete
    pub(crate) doomed: Option<PathBuf>,
}

pub(crate) struct StoreState {
    requests: HashMap<RequestKey, Request>,
    next_id: u64,
    pub(crate) pool: Option<WorkerPool>,
}

impl StoreState {
    /// Any request with at least one waiting caller.
    pub(crate) fn has_live_work(&self) -> bool {
        self.requests.values().any(|req| req.refs.is_live())
    }

    fn get_or_create(&mut self, key: &RequestKey, engine: &Arc<dyn OcrEngine>) -> &mut Request {
        let next_id = &mut self.next_id;
        self.requests.entry(key.clone()).or_insert_with(|| {
            let id = RequestId(*next_id);
            *next_id += 1;
            Request::new(id, Arc::clone(engine))
        })
    }

    /// The request for `key`, provided it is still generation `id`.
    fn get_current(&mut self, key: &RequestKey, id: RequestId) -> Option<&mut Request> {
        self.requests.get_mut(key).filter(|req| req.id == id)
    }

    /// Drop a request nobody is waiting for.
    ///
    /// Returns the temp image to delete, if this call is responsible for it.
    /// A request that is being processed keeps its image: the worker still
    /// reads it and deletes it afterwards. A request without a result is
    /// cancelled and evicted; one with a result stays cached.
    fn try_garbage_collect(&mut self, key: &RequestKey) -> Option<PathBuf> {
        let req = self.requests.get_mut(key)?;
        if req.refs.is_live() {
            return None;
        }

        let doomed = if req.processing { None } else { req.temp_image.take() };
        if req.result.is_none() {
            req.cancel();
            self.requests.remove(key);
            tracing::debug!(request = %key, "Evicted abandoned OCR request");
        }
        doomed
    }
}

/// Mapping from [`RequestKey`] to request, behind one mutex.
pub struct RequestStore {
    state: Mutex<StoreState>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                requests: HashMap::new(),
                next_id: 0,
                pool: None,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock()
    }

    /// Register a caller for `key`, creating the request if needed.
    ///
    /// The first caller of a new request donates `temp_image`. Every admitted
    /// caller also adds one wake-up to `wake`.
    pub(crate) fn admit(
        &self,
        key: RequestKey,
        engine: &Arc<dyn OcrEngine>,
        temp_image: PathBuf,
        priority: OcrPriority,
        wake: &WakeSignal,
    ) -> Admission {
        let mut state = self.lock();
        let req = state.get_or_create(&key, engine);

        if let Some(result) = &req.result {
            return Admission::Cached(Arc::clone(result));
        }

        let donated = if req.temp_image.is_none() {
            req.temp_image = Some(temp_image);
            true
        } else {
            false
        };
        req.refs.increment(priority);
        let ticket = RequestTicket {
            id: req.id,
            priority,
            completion: req.subscribe(),
            key,
        };
        wake.notify();

        Admission::Joined { ticket, donated }
    }

    /// Withdraw a caller's vote and collect the request if it was the last one.
    pub(crate) fn depart(&self, ticket: &RequestTicket) -> Departure {
        let mut state = self.lock();
        let Some(req) = state.get_current(&ticket.key, ticket.id) else {
            // Evicted after an engine failure; nothing left to count or clean.
            return Departure::default();
        };

        req.refs.decrement(ticket.priority);
        let result = req.result.clone();
        let doomed = state.try_garbage_collect(&ticket.key);
        Departure { result, doomed }
    }

    /// Claim the highest-priority dispatchable request for a worker.
    pub(crate) fn checkout_next(&self) -> Option<Checkout> {
        let mut state = self.lock();
        let key = dispatch::select_next(state.requests.iter().map(|(key, req)| {
            (
                key,
                Candidate {
                    sequence: req.id.0,
                    foreground: req.refs.get(OcrPriority::Foreground),
                    background: req.refs.get(OcrPriority::Background),
                    dispatchable: req.is_dispatchable(),
                },
            )
        }))?
        .clone();

        let req = state.requests.get_mut(&key)?;
        let temp_image = req.temp_image.clone()?;
        req.processing = true;

        Some(Checkout {
            id: req.id,
            engine: Arc::clone(&req.engine),
            cancel: req.cancel_token(),
            temp_image,
            key,
        })
    }

    /// Record a worker's outcome and wake every waiting caller.
    ///
    /// A request left without a result is evicted so the next identical
    /// enqueue retries the engine. The worker keeps responsibility for
    /// deleting the temp image it read.
    pub(crate) fn complete(&self, checkout: &Checkout, result: Option<OcrResult>) {
        let mut state = self.lock();
        let Some(req) = state.get_current(&checkout.key, checkout.id) else {
            // Abandoned and evicted while the engine ran.
            return;
        };

        if let Some(result) = result {
            req.result = Some(Arc::new(result));
        }
        req.processing = false;
        req.temp_image = None;
        req.signal_completion();

        if req.result.is_none() {
            state.requests.remove(&checkout.key);
            tracing::debug!(request = %checkout.key, "Evicted OCR request without result");
        }
    }

    /// True if `key` has a finished result.
    pub fn has_cached_result(&self, key: &RequestKey) -> bool {
        self.lock()
            .requests
            .get(key)
            .is_some_and(|req| req.result.is_some())
    }

    /// Requests with at least one waiting caller.
    pub fn pending_count(&self) -> usize {
        self.lock().requests.values().filter(|req| req.refs.is_live()).count()
    }

    /// Requests holding a result.
    pub fn cached_count(&self) -> usize {
        self.lock().requests.values().filter(|req| req.result.is_some()).count()
    }

    /// All requests currently in the map.
    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}
