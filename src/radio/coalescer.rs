//! Per-endpoint debounce of output writes.
//!
//! The bus is slow relative to how fast overlapping valve on/off calls arrive, so
//! writing on every call would serialize callers behind bus latency and let stale
//! writes overtake fresher ones. Instead each `link_id` gets its own quiet-period
//! timer: a new request for the same endpoint cancels and replaces the pending
//! one, and when the window elapses with no further requests exactly one
//! "set outputs" command goes out carrying the latest requested byte. Distinct
//! endpoints debounce independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;

use super::BusCore;

struct PendingWrite {
    desired: u8,
    /// Identity of the timer that owns this entry. A timer may only claim the
    /// entry whose generation it was spawned with: an expiring timer that loses
    /// the race against a superseding request must not walk off with the
    /// successor's write.
    generation: u64,
    timer: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<u8, PendingWrite>>>;

/// Timer table mapping `link_id` to its one outstanding write. At most one
/// pending write per endpoint exists at any time.
pub(crate) struct OutputCoalescer {
    window: Duration,
    generation: AtomicU64,
    pending: PendingMap,
    core: Arc<tokio::sync::Mutex<BusCore>>,
}

impl OutputCoalescer {
    pub(crate) fn new(window: Duration, core: Arc<tokio::sync::Mutex<BusCore>>) -> Self {
        OutputCoalescer {
            window,
            generation: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
            core,
        }
    }

    /// Schedule (or reschedule) the delayed write for `link_id`. Must be called
    /// from within a tokio runtime.
    pub(crate) fn request(&self, link_id: u8, desired: u8) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(previous) = pending.remove(&link_id) {
            previous.timer.abort();
            debug!(
                "superseding pending write for lid {}: {:#04x} -> {:#04x}",
                link_id, previous.desired, desired
            );
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let map = Arc::clone(&self.pending);
        let core = Arc::clone(&self.core);
        // Pin the deadline to the request itself, not to whenever the timer
        // task is first polled, so the quiet period measures from this call.
        let deadline = tokio::time::Instant::now() + self.window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            Self::fire(map, core, link_id, generation).await;
        });
        pending.insert(
            link_id,
            PendingWrite {
                desired,
                generation,
                timer,
            },
        );
    }

    /// Claim and dispatch the pending write for `link_id`, but only if the entry
    /// still carries `generation`. A mismatch means the timer was superseded
    /// between waking and claiming; the successor's entry is left in place for
    /// the successor's own timer. A cancel arriving after the claim is a no-op
    /// because the write is already dispatched.
    async fn fire(
        map: PendingMap,
        core: Arc<tokio::sync::Mutex<BusCore>>,
        link_id: u8,
        generation: u64,
    ) {
        let claimed = {
            let mut pending = map.lock().unwrap();
            match pending.get(&link_id) {
                Some(write) if write.generation == generation => pending.remove(&link_id),
                _ => None,
            }
        };
        let Some(write) = claimed else { return };
        let mut core = core.lock().await;
        if let Err(e) = core.port.set_outputs(link_id, write.desired) {
            // Dropped, not retried: the next request or debounce cycle
            // carries fresher intent anyway.
            warn!("debounced output write for lid {} dropped: {}", link_id, e);
        }
    }

    /// Cancel every outstanding write without flushing it. Teardown does not
    /// guarantee delivery of the last command.
    pub(crate) fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap();
        for (link_id, write) in pending.drain() {
            write.timer.abort();
            debug!("cancelled pending write for lid {}", link_id);
        }
    }
}

impl Drop for OutputCoalescer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
