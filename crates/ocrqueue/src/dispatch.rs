//! Dispatch rule and worker wake-up signal.
//!
//! Foreground interest beats background interest. Among requests with equal
//! foreground counts the one with more background callers wins, and remaining
//! ties go to the oldest request so equal work is served first-come.

use tokio::sync::Semaphore;

/// The fields of a request that the dispatch rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Creation order of the request (lower is older)
    pub sequence: u64,
    pub foreground: usize,
    pub background: usize,
    /// Live, unclaimed, unresolved and owning an image
    pub dispatchable: bool,
}

/// Pick the next request to hand to a free worker.
pub fn select_next<K>(candidates: impl IntoIterator<Item = (K, Candidate)>) -> Option<K> {
    candidates
        .into_iter()
        .filter(|(_, candidate)| candidate.dispatchable)
        .max_by(|(_, a), (_, b)| {
            a.foreground
                .cmp(&b.foreground)
                .then(a.background.cmp(&b.background))
                .then(b.sequence.cmp(&a.sequence))
        })
        .map(|(key, _)| key)
}

/// Counting wake-up signal between `enqueue` and the workers.
///
/// Every admitted caller adds one permit; every dispatch attempt consumes one.
/// Permits outlive worker pools, so a stopped pool never loses a wake-up for
/// the next one.
#[derive(Debug)]
pub struct WakeSignal {
    permits: Semaphore,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
        }
    }

    /// Announce that new work may be available.
    pub fn notify(&self) {
        self.permits.add_permits(1);
    }

    /// Wait for and consume one wake-up.
    pub async fn wait(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }

    /// Wake-ups not yet consumed.
    pub fn pending(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}
