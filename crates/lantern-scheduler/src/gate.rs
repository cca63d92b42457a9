use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    /// Maximum number of guarded operations running at once, across all keys.
    pub max_concurrency: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self { max_concurrency: 3 }
    }
}

/// Why [`CoalescingGate::try_acquire`] refused to start an operation.
///
/// This is a "try again later" signal for the caller, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateBusy {
    #[error("{in_flight} of {limit} operations already running; try again later")]
    Global { in_flight: usize, limit: usize },
    #[error("an operation for `{key}` is already running; try again later")]
    Key { key: String },
}

#[derive(Debug)]
struct GateState<K> {
    in_flight: usize,
    busy: HashSet<K>,
}

#[derive(Debug)]
struct GateInner<K> {
    limit: usize,
    state: Mutex<GateState<K>>,
}

/// Admission control for expensive operations.
///
/// A key is either idle or busy; a permit moves it to busy and dropping the permit moves it
/// back. Independently, at most `max_concurrency` permits exist at once. Nothing queues: a
/// refused caller gets [`GateBusy`] immediately.
#[derive(Debug)]
pub struct CoalescingGate<K> {
    inner: Arc<GateInner<K>>,
}

impl<K> Clone for CoalescingGate<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> CoalescingGate<K>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    pub fn new(settings: GateSettings) -> Self {
        Self {
            inner: Arc::new(GateInner {
                limit: settings.max_concurrency.max(1),
                state: Mutex::new(GateState {
                    in_flight: 0,
                    busy: HashSet::new(),
                }),
            }),
        }
    }

    pub fn try_acquire(&self, key: K) -> Result<GatePermit<K>, GateBusy> {
        let mut state = self.inner.state.lock();
        if state.busy.contains(&key) {
            tracing::debug!(target = "lantern.scheduler", key = %key, "gate busy for key");
            return Err(GateBusy::Key {
                key: key.to_string(),
            });
        }
        if state.in_flight >= self.inner.limit {
            tracing::debug!(
                target = "lantern.scheduler",
                key = %key,
                in_flight = state.in_flight,
                limit = self.inner.limit,
                "gate at global capacity"
            );
            return Err(GateBusy::Global {
                in_flight: state.in_flight,
                limit: self.inner.limit,
            });
        }

        state.in_flight += 1;
        state.busy.insert(key.clone());
        Ok(GatePermit {
            inner: Arc::clone(&self.inner),
            key: Some(key),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    pub fn is_busy(&self, key: &K) -> bool {
        self.inner.state.lock().busy.contains(key)
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }
}

/// Proof of admission. Dropping it releases both the key and the global slot.
#[must_use = "the gate is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct GatePermit<K: Eq + Hash> {
    inner: Arc<GateInner<K>>,
    key: Option<K>,
}

impl<K: Eq + Hash> GatePermit<K> {
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }
}

impl<K: Eq + Hash> Drop for GatePermit<K> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let mut state = self.inner.state.lock();
        state.busy.remove(&key);
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}
