use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Marker error for work abandoned because its [`CancellationToken`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// Races `fut` against `token`. Whichever settles first wins.
///
/// An already-cancelled token short-circuits without polling `fut`.
pub async fn run_cancellable<F>(token: &CancellationToken, fut: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    if token.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}
