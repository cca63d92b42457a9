use std::{
    collections::HashMap,
    fmt,
    future::Future,
    hash::Hash,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::Cancelled;

type BoxedOperation<T, E> =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<T, E>> + Send>> + Send>;

/// The single pending slot of a key: the operation that will run when the timer fires and
/// everyone waiting for its result.
struct PendingSlot<T, E> {
    generation: u64,
    operation: BoxedOperation<T, E>,
    waiters: Vec<oneshot::Sender<Result<T, E>>>,
    timer: tokio::task::JoinHandle<()>,
}

struct CoalescerInner<K, T, E> {
    next_generation: AtomicU64,
    slots: Mutex<HashMap<K, PendingSlot<T, E>>>,
}

/// Trailing-edge, argument-replacing debouncer.
///
/// Each call to [`KeyedCoalescer::debounce`] (re)starts the key's timer and replaces the
/// pending operation with its own. When the timer fires, the last operation runs once and
/// every caller coalesced into that slot receives a clone of its result, errors included.
///
/// Once an operation starts running its slot is released; calls arriving during the run
/// open a new slot rather than joining it.
pub struct KeyedCoalescer<K, T, E> {
    inner: Arc<CoalescerInner<K, T, E>>,
}

impl<K, T, E> Clone for KeyedCoalescer<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T, E> Default for KeyedCoalescer<K, T, E>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    T: Clone + Send + 'static,
    E: Clone + From<Cancelled> + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, E> KeyedCoalescer<K, T, E>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    T: Clone + Send + 'static,
    E: Clone + From<Cancelled> + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                next_generation: AtomicU64::new(1),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Schedules `operation` to run `wait` after the last call for `key`.
    ///
    /// Resolves to `E::from(Cancelled)` if the slot is cancelled before it runs.
    pub async fn debounce<F, Fut>(&self, key: K, wait: Duration, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let operation: BoxedOperation<T, E> = Box::new(move || Box::pin(operation()));
        let (tx, rx) = oneshot::channel();

        {
            let mut slots = self.inner.slots.lock();
            let mut waiters = match slots.remove(&key) {
                Some(previous) => {
                    previous.timer.abort();
                    tracing::trace!(
                        target = "lantern.scheduler",
                        key = ?key,
                        coalesced = previous.waiters.len(),
                        "rescheduling debounced operation"
                    );
                    previous.waiters
                }
                None => Vec::new(),
            };
            waiters.push(tx);

            // The timer task blocks on this lock until the slot below is in place.
            let timer = tokio::spawn(fire(Arc::clone(&self.inner), key.clone(), generation, wait));
            slots.insert(
                key,
                PendingSlot {
                    generation,
                    operation,
                    waiters,
                    timer,
                },
            );
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(E::from(Cancelled)),
        }
    }

    /// Drops the pending slot of `key`; its waiters resolve as cancelled.
    pub fn cancel(&self, key: &K) -> bool {
        let Some(slot) = self.inner.slots.lock().remove(key) else {
            return false;
        };
        slot.timer.abort();
        true
    }

    pub fn cancel_all(&self) {
        let slots: Vec<_> = self.inner.slots.lock().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            slot.timer.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.inner.slots.lock().contains_key(key)
    }
}

async fn fire<K, T, E>(inner: Arc<CoalescerInner<K, T, E>>, key: K, generation: u64, wait: Duration)
where
    K: Eq + Hash + fmt::Debug,
    T: Clone,
    E: Clone,
{
    tokio::time::sleep(wait).await;

    let slot = {
        let mut slots = inner.slots.lock();
        match slots.get(&key) {
            Some(slot) if slot.generation == generation => slots.remove(&key),
            _ => None,
        }
    };
    let Some(slot) = slot else {
        return;
    };

    tracing::debug!(
        target = "lantern.scheduler",
        key = ?key,
        waiters = slot.waiters.len(),
        "running debounced operation"
    );
    let result = (slot.operation)().await;
    for waiter in slot.waiters {
        let _ = waiter.send(result.clone());
    }
}
