//! Per-kind rate-limited work queue.
//!
//! Guarantees per-key serialization: a key handed to a worker is marked
//! in flight, and re-adds while in flight park in a dirty map that
//! re-enqueues the key when the worker calls [`WorkQueue::done`]. The
//! dirty map remembers whether the re-add was immediate or delayed, so a
//! requeue-after or backoff requested mid-flight keeps its deadline
//! instead of firing as soon as the worker finishes. Failed keys requeue
//! with exponential backoff (base 5 ms, cap 1000 s).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::meta::ObjectKey;

/// Base delay of the per-key exponential backoff.
pub const BACKOFF_BASE: Duration = Duration::from_millis(5);

/// Cap of the per-key exponential backoff.
pub const BACKOFF_CAP: Duration = Duration::from_secs(1000);

/// How a dirty key re-enqueues once its in-flight run finishes. An
/// immediate re-add outranks any delayed one; competing delays keep the
/// earliest deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirtyReadd {
    /// Re-enqueue as soon as the worker calls `done`.
    Immediate,
    /// Re-enqueue no earlier than the deadline.
    After(Instant),
}

#[derive(Default)]
struct QueueState {
    /// Keys ready to be handed out, oldest first.
    ready: VecDeque<ObjectKey>,
    /// Keys currently in `ready` or `delayed` (dedup guard).
    queued: HashSet<ObjectKey>,
    /// Keys a worker currently holds.
    in_flight: HashSet<ObjectKey>,
    /// Keys re-added while in flight, with their re-add schedule.
    dirty: HashMap<ObjectKey, DirtyReadd>,
    /// Keys waiting out a delay, ordered by deadline.
    delayed: BTreeMap<(Instant, u64), ObjectKey>,
    /// Tie-breaker for identical deadlines.
    delay_seq: u64,
    /// Consecutive failure count per key, driving backoff.
    failures: HashMap<ObjectKey, u32>,
    shutdown: bool,
}

impl QueueState {
    /// Record a dirty re-add for an in-flight key, keeping the most
    /// urgent schedule already on file.
    fn mark_dirty(&mut self, key: ObjectKey, readd: DirtyReadd) {
        match (self.dirty.get(&key), readd) {
            // An immediate re-add already wins.
            (Some(DirtyReadd::Immediate), _) => {}
            // An earlier deadline already wins.
            (Some(DirtyReadd::After(existing)), DirtyReadd::After(deadline))
                if *existing <= deadline => {}
            _ => {
                self.dirty.insert(key, readd);
            }
        }
    }
}

/// A rate-limited, deduplicating work queue over object keys.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// New empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a key immediately. Duplicate adds coalesce; adds for an
    /// in-flight key mark it dirty instead; adds for a key waiting out a
    /// delay promote it to run now (a fresh input change outranks a
    /// backoff schedule).
    pub fn add(&self, key: ObjectKey) {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            if state.shutdown {
                return;
            }
            if state.in_flight.contains(&key) {
                state.mark_dirty(key, DirtyReadd::Immediate);
                return;
            }
            if !state.queued.insert(key.clone()) {
                let delayed_slot = state
                    .delayed
                    .iter()
                    .find(|(_, queued_key)| **queued_key == key)
                    .map(|(slot, _)| *slot);
                match delayed_slot {
                    Some(slot) => {
                        state.delayed.remove(&slot);
                        state.ready.push_back(key);
                    }
                    None => return,
                }
            } else {
                state.ready.push_back(key);
            }
        }
        self.notify.notify_waiters();
    }

    /// Enqueue a key after a fixed delay, honored verbatim. For an
    /// in-flight key the deadline is parked in the dirty map and the
    /// delayed re-enqueue happens on `done`.
    pub fn add_after(&self, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        self.add_at(key, Instant::now() + delay);
    }

    /// Enqueue a key to run no earlier than `deadline`.
    fn add_at(&self, key: ObjectKey, deadline: Instant) {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            if state.shutdown {
                return;
            }
            if state.in_flight.contains(&key) {
                state.mark_dirty(key, DirtyReadd::After(deadline));
                return;
            }
            if !state.queued.insert(key.clone()) {
                return;
            }
            let seq = state.delay_seq;
            state.delay_seq += 1;
            state.delayed.insert((deadline, seq), key);
        }
        self.notify.notify_waiters();
    }

    /// Enqueue a key with exponential backoff based on its consecutive
    /// failure count.
    pub fn add_rate_limited(&self, key: ObjectKey) {
        let delay = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            let attempts = state.failures.entry(key.clone()).or_insert(0);
            let delay = backoff_delay(*attempts);
            *attempts = attempts.saturating_add(1);
            delay
        };
        self.add_after(key, delay);
    }

    /// Reset the failure count for a key after a successful reconcile.
    pub fn forget(&self, key: &ObjectKey) {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .failures
            .remove(key);
    }

    /// Current failure count for a key (test observability).
    pub fn failure_count(&self, key: &ObjectKey) -> u32 {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Mark a key finished. A dirty key re-enqueues on the schedule it
    /// accumulated while in flight: immediately for plain re-adds, at its
    /// deadline for requeue-after and backoff requests.
    pub fn done(&self, key: &ObjectKey) {
        let readd = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            state.in_flight.remove(key);
            state.dirty.remove(key)
        };
        match readd {
            Some(DirtyReadd::Immediate) => self.add(key.clone()),
            Some(DirtyReadd::After(deadline)) => self.add_at(key.clone(), deadline),
            None => {}
        }
    }

    /// Stop handing out work. Pending waiters return `None`.
    pub fn shut_down(&self) {
        self.state.lock().expect("queue lock poisoned").shutdown = true;
        self.notify.notify_waiters();
    }

    /// Number of keys waiting (ready + delayed), excluding in-flight.
    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("queue lock poisoned");
        state.ready.len() + state.delayed.len()
    }

    /// Whether no keys are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    /// The returned key is in flight until [`WorkQueue::done`] is called.
    pub async fn next(&self) -> Option<ObjectKey> {
        loop {
            // Register interest before inspecting state so a notification
            // between the check and the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait_until = {
                let mut state = self.state.lock().expect("queue lock poisoned");
                if state.shutdown {
                    return None;
                }
                promote_due(&mut state);
                if let Some(key) = state.ready.pop_front() {
                    state.queued.remove(&key);
                    state.in_flight.insert(key.clone());
                    return Some(key);
                }
                state.delayed.keys().next().map(|(deadline, _)| *deadline)
            };

            match wait_until {
                Some(deadline) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

fn promote_due(state: &mut QueueState) {
    let now = Instant::now();
    while let Some((&(deadline, seq), _)) = state.delayed.iter().next() {
        if deadline > now {
            break;
        }
        if let Some(key) = state.delayed.remove(&(deadline, seq)) {
            state.ready.push_back(key);
        }
    }
}

/// Exponential backoff: `base * 2^attempts`, capped.
fn backoff_delay(attempts: u32) -> Duration {
    let exp = attempts.min(63);
    let nanos = BACKOFF_BASE.as_nanos().saturating_mul(1u128 << exp);
    if nanos >= BACKOFF_CAP.as_nanos() {
        BACKOFF_CAP
    } else {
        Duration::from_nanos(nanos as u64)
    }
}
