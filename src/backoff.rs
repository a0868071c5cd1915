//! A single retry primitive shared by the metadata and coordinator
//! refreshers (spec Design Note: "Retry loops ... are structurally
//! identical: `(retries, delay, predicate)` -- factor one retry primitive").

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// What a single attempt decided.
pub enum RetryDecision<T, E> {
    /// The attempt succeeded (or failed in a way that should not be
    /// retried); stop and return this value.
    Done(T),
    /// The attempt should be retried, carrying the error observed so it can
    /// be returned if retries are exhausted.
    Retry(E),
}

/// Runs `attempt` up to `attempts` times, sleeping `delay` between tries.
/// `attempt` is given the 0-based try index so callers can fold it into a
/// correlation id or log field.
///
/// Returns `Ok` on the first [`RetryDecision::Done`], or `Err` with the last
/// observed error once `attempts` tries have been made.
pub async fn retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut attempt: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RetryDecision<T, E>>,
{
    assert!(attempts > 0, "retry requires at least one attempt");

    let mut last_err = None;
    for try_index in 0..attempts {
        match attempt(try_index).await {
            RetryDecision::Done(value) => return Ok(value),
            RetryDecision::Retry(err) => {
                last_err = Some(err);
                if try_index + 1 < attempts {
                    debug!(try_index, ?delay, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    // Safe: the loop always runs at least once (attempts > 0), so either we
    // returned on `Done` above or `last_err` was set on the final iteration.
    Err(last_err.expect("at least one attempt runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ()> = retry(3, Duration::from_millis(1), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { RetryDecision::Done(42) }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_configured_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &'static str> = retry(3, Duration::from_millis(1), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { RetryDecision::Retry("still failing") }
        })
        .await;

        assert_eq!(result, Err("still failing"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_retrying_once_done() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &'static str> = retry(5, Duration::from_millis(1), |try_index| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if try_index < 2 {
                    RetryDecision::Retry("not yet")
                } else {
                    RetryDecision::Done(try_index)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
