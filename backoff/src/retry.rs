use std::future::Future;
use std::time::Duration;

/// Decides whether an error is worth another attempt.
pub trait Condition<E> {
    fn can_retry(&self, error: &E) -> bool;
}

impl<E, F> Condition<E> for F
where
    F: Fn(&E) -> bool,
{
    fn can_retry(&self, error: &E) -> bool {
        self(error)
    }
}

/// Runs `operation` until it succeeds, the error is not retryable, or the
/// backoff strategy runs out of intervals. The first run is not counted as a
/// retry, so a strategy of `n` intervals allows `n + 1` attempts in total.
pub async fn retry<I, F, Fut, T, E, C>(backoff: I, mut operation: F, condition: C) -> Result<T, E>
where
    I: IntoIterator<Item = Duration>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Condition<E>,
{
    let mut backoff = backoff.into_iter();
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !condition.can_retry(&err) {
                    return Err(err);
                }
                // ran out of backoff, return the last error
                let Some(duration) = backoff.next() else {
                    return Err(err);
                };
                tokio::time::sleep(duration).await;
            }
        }
    }
}
