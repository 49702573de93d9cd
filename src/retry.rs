//! Retry policy and the generic "attempt with policy" combinator.
//!
//! Vision-model calls fail in two recoverable ways that need different
//! remedies:
//!
//! * **Transient** (timeouts, throttling, 5xx): wait and try again. The wait
//!   grows geometrically, `base_delay * backoff_multiplier^n`, so a recovering
//!   endpoint is not hammered.
//! * **Too large** (pixel or payload limits): waiting does not help. The
//!   input is degraded (the page image shrunk) and retried immediately.
//!
//! The two strategies keep independent counters. Exhausting either bound,
//! or hitting a [`ErrorClass::Fatal`] error, ends the attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Retry after a backoff delay.
    Transient,
    /// Retry immediately with a degraded input.
    TooLarge,
    /// Give up.
    Fatal,
}

/// Errors that know their own [`ErrorClass`].
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Bounds and timing for [`attempt_with_policy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after transient failures (total attempts = `max_retries + 1`). Default: 3.
    pub max_retries: u32,
    /// Delay before the first transient retry. Default: 10 s.
    pub base_delay: Duration,
    /// Growth factor applied to the delay after each transient retry. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Degrade-and-retry rounds allowed after too-large failures. Default: 5.
    pub max_resizes: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            max_resizes: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before transient retry number `retry` (0-based). Saturates at
    /// [`Duration::MAX`].
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

/// Why [`attempt_with_policy`] gave up.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: E },

    #[error("still too large after {resizes} resizes: {last}")]
    ResizesExhausted { resizes: u32, last: E },

    #[error("{0}")]
    Fatal(E),
}

/// Run `op` against `input` until it succeeds or the policy says stop.
///
/// `op` receives a clone of the current input on every attempt. On a
/// too-large failure `degrade` produces the next (smaller) input; returning
/// `None` means the input cannot be degraded further and the error is fatal.
pub async fn attempt_with_policy<S, T, E, Op, Fut, Degrade>(
    policy: &RetryPolicy,
    mut input: S,
    mut op: Op,
    mut degrade: Degrade,
) -> Result<T, RetryError<E>>
where
    S: Clone,
    E: Classify + fmt::Display,
    Op: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Degrade: FnMut(&S) -> Option<S>,
{
    let mut retries = 0u32;
    let mut resizes = 0u32;

    loop {
        let err = match op(input.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match err.class() {
            ErrorClass::Transient => {
                if retries >= policy.max_retries {
                    return Err(RetryError::RetriesExhausted {
                        attempts: retries + 1,
                        last: err,
                    });
                }
                let delay = policy.delay_for(retries);
                retries += 1;
                warn!(
                    "Transient failure, retry {}/{} in {:?}: {}",
                    retries, policy.max_retries, delay, err
                );
                sleep(delay).await;
            }
            ErrorClass::TooLarge => {
                if resizes >= policy.max_resizes {
                    return Err(RetryError::ResizesExhausted { resizes, last: err });
                }
                match degrade(&input) {
                    Some(smaller) => {
                        input = smaller;
                        resizes += 1;
                        warn!(
                            "Input too large, degraded {}/{}: {}",
                            resizes, policy.max_resizes, err
                        );
                    }
                    None => return Err(RetryError::Fatal(err)),
                }
            }
            ErrorClass::Fatal => return Err(RetryError::Fatal(err)),
        }
    }
}
