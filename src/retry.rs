// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded retry with pluggable backoff and sleeping.
//!
//! One [`RetryPolicy`] type drives both the Coordinator registration loop and
//! the snapshot writes. The wait between attempts goes through a [`Sleeper`]
//! so tests can record the schedule instead of waiting it out.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time, via `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested waits and returns immediately.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordingSleeper {
    waits: Arc<std::sync::Mutex<Vec<Duration>>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every wait requested so far, in order.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Sum of all requested waits.
    pub fn total(&self) -> Duration {
        self.waits().into_iter().sum()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `min(base * 2^attempt, cap)`.
    Exponential { base: Duration, cap: Duration },
    Fixed(Duration),
}

impl Backoff {
    /// Wait after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(cap).min(cap)
            }
            Backoff::Fixed(delay) => delay,
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Coordinator registration: 5 attempts, 1 s doubling up to 16 s.
    pub fn registration() -> Self {
        Self::new(
            5,
            Backoff::Exponential {
                base: Duration::from_millis(1000),
                cap: Duration::from_millis(16_000),
            },
        )
    }

    /// Snapshot writes: a handful of quick attempts to ride out contention.
    pub fn database() -> Self {
        Self::new(
            3,
            Backoff::Exponential {
                base: Duration::from_millis(100),
                cap: Duration::from_millis(1000),
            },
        )
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay_for(attempt)
    }

    /// Wait the backoff delay that follows failed attempt `attempt`.
    pub async fn pause_after(&self, attempt: u32) {
        self.sleeper.sleep(self.delay_for(attempt)).await;
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// `op` receives the zero-based attempt index.
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_while(label, |_| true, op).await
    }

    /// Like [`Self::run`], but an error for which `retryable` is false is
    /// returned at once.
    pub async fn run_while<T, E, F, Fut, R>(&self, label: &str, retryable: R, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt + 1 >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }
                    tracing::warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    self.pause_after(attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`Self::run`], lending `ctx` mutably to each attempt.
    ///
    /// Used for statements that must run on one connection (inside an open
    /// transaction) across retries.
    pub async fn run_with<C, T, E, F>(&self, label: &str, ctx: &mut C, mut op: F) -> Result<T, E>
    where
        C: ?Sized + Send,
        F: for<'c> FnMut(&'c mut C) -> BoxFuture<'c, Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(&mut *ctx).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt + 1 >= self.max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    self.pause_after(attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn registration_schedule_matches_contract() {
        let policy = RetryPolicy::registration();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(policy.delay_for(9), Duration::from_millis(16_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(16_000));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed(Duration::from_millis(250));
        assert_eq!(backoff.delay_for(0), backoff.delay_for(7));
    }

    #[tokio::test]
    async fn run_retries_until_success() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::registration().with_sleeper(Arc::new(sleeper.clone()));
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = policy
            .run("flaky", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(format!("boom {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn run_gives_up_after_max_attempts() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(5)))
            .with_sleeper(Arc::new(sleeper.clone()));

        let result: Result<(), String> = policy
            .run("always-fails", |attempt| async move { Err(format!("fail {attempt}")) })
            .await;

        assert_eq!(result, Err("fail 2".to_string()));
        assert_eq!(sleeper.waits().len(), 2);
    }

    #[tokio::test]
    async fn permanent_error_stops_retrying() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::registration().with_sleeper(Arc::new(sleeper.clone()));
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = policy
            .run_while(
                "permanent",
                |err: &String| !err.starts_with("fatal"),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal: bad key".to_string()) }
                },
            )
            .await;

        assert_eq!(result, Err("fatal: bad key".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn run_with_lends_context_to_each_attempt() {
        let policy = RetryPolicy::new(4, Backoff::Fixed(Duration::ZERO))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        let mut log: Vec<u32> = Vec::new();

        let result: Result<usize, String> = policy
            .run_with("lend", &mut log, |log| {
                Box::pin(async move {
                    log.push(log.len() as u32);
                    if log.len() < 3 {
                        Err("not yet".to_string())
                    } else {
                        Ok(log.len())
                    }
                })
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(log, vec![0, 1, 2]);
    }
}
