use std::{fmt::Display, future::Future, time::Duration};

use tokio_retry::{strategy::FixedInterval, RetryIf};

/// Errors that may go away when the same operation is attempted again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Runs `action` until it succeeds or fails with a non-transient error,
/// waiting `delay` between attempts. There is no upper bound on attempts.
pub async fn retry_forever<T, E, A, Fut>(delay: Duration, what: &str, mut action: A) -> Result<T, E>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    RetryIf::start(
        FixedInterval::new(delay),
        move || {
            let attempt = action();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_transient() {
                        warn!("{} failed, retrying in {:?}: {}", what, delay, e);
                    }
                    e
                })
            }
        },
        |e: &E| e.is_transient(),
    )
    .await
}
