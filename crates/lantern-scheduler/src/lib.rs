//! Guards in front of expensive backend calls: a per-key/global concurrency gate, a trailing
//! edge debouncer, bounded retries and cancellation helpers.

mod cancel;
mod debouncer;
mod gate;
mod retry;

pub use cancel::{run_cancellable, Cancelled};
pub use debouncer::KeyedCoalescer;
pub use gate::{CoalescingGate, GateBusy, GatePermit, GateSettings};
pub use retry::{retry_on_failure, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
