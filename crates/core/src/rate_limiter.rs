//! Token-bucket admission gate for outbound requests
//!
//! The bucket holds `capacity` tokens and is refilled to full once per
//! second. Callers that find it empty queue up and are served oldest first
//! on the next refill.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

use crate::error::{Error, Result};

const REFILL_PERIOD: Duration = Duration::from_secs(1);

/// Shared request gate. Clones refer to the same bucket.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Option<Arc<Inner>>,
}

struct Inner {
    capacity: u32,
    bucket: Mutex<TokenBucket>,
    refill_task: Mutex<Option<JoinHandle<()>>>,
}

struct TokenBucket {
    tokens: u32,
    waiters: VecDeque<oneshot::Sender<()>>,
    stopped: bool,
}

impl TokenBucket {
    /// Refill to capacity and hand tokens to queued waiters, oldest first.
    fn refill(&mut self, capacity: u32) {
        self.tokens = capacity;
        while self.tokens > 0 {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            // A dropped waiter gave up; its token goes to the next one.
            if waiter.send(()).is_ok() {
                self.tokens -= 1;
            }
        }
    }
}

impl RateLimiter {
    /// Create a limiter admitting `rps` requests per second.
    ///
    /// `None`, zero, negative or non-finite values disable limiting. Must be
    /// called inside a tokio runtime when limiting is enabled.
    pub fn new(rps: Option<f64>) -> Self {
        let capacity = match rps {
            Some(rps) if rps.is_finite() && rps > 0.0 => rps.ceil().min(u32::MAX as f64) as u32,
            _ => return Self::unlimited(),
        };

        let inner = Arc::new(Inner {
            capacity,
            bucket: Mutex::new(TokenBucket {
                tokens: capacity,
                waiters: VecDeque::new(),
                stopped: false,
            }),
            refill_task: Mutex::new(None),
        });

        let handle = tokio::spawn(refill_loop(Arc::downgrade(&inner)));
        *inner.refill_task.lock() = Some(handle);

        Self { inner: Some(inner) }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self { inner: None }
    }

    /// Tokens per refill, or `None` when unlimited
    pub fn capacity(&self) -> Option<u32> {
        self.inner.as_ref().map(|inner| inner.capacity)
    }

    /// Wait until a slot is available and take it.
    ///
    /// Fails only once the limiter has been stopped.
    pub async fn acquire(&self) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        let waiter = {
            let mut bucket = inner.bucket.lock();
            if bucket.stopped {
                return Err(Error::RateLimiterStopped);
            }
            if bucket.tokens > 0 && bucket.waiters.is_empty() {
                bucket.tokens -= 1;
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            bucket.waiters.push_back(tx);
            rx
        };

        waiter.await.map_err(|_| Error::RateLimiterStopped)
    }

    /// Cancel the refill timer and release every queued waiter with an error.
    pub fn stop(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        if let Some(handle) = inner.refill_task.lock().take() {
            handle.abort();
        }
        let mut bucket = inner.bucket.lock();
        bucket.stopped = true;
        bucket.waiters.clear();
    }

    /// Number of callers currently waiting
    pub fn queued(&self) -> usize {
        self.inner
            .as_ref()
            .map(|inner| inner.bucket.lock().waiters.len())
            .unwrap_or(0)
    }
}

async fn refill_loop(inner: Weak<Inner>) {
    let mut ticker = interval_at(Instant::now() + REFILL_PERIOD, REFILL_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let mut bucket = inner.bucket.lock();
        bucket.refill(inner.capacity);
        trace!(
            tokens = bucket.tokens,
            queued = bucket.waiters.len(),
            "rate limiter refilled"
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.refill_task.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::new(None);
        assert_eq!(limiter.capacity(), None);
        for _ in 0..1000 {
            limiter.acquire().await.unwrap();
        }

        assert_eq!(RateLimiter::new(Some(0.0)).capacity(), None);
        assert_eq!(RateLimiter::new(Some(f64::INFINITY)).capacity(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_then_fifo_after_refill() {
        let limiter = RateLimiter::new(Some(2.0));
        let start = Instant::now();

        let (tx, mut rx) = mpsc::unbounded_channel();
        for id in 0..5 {
            let limiter = limiter.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                limiter.acquire().await.unwrap();
                let _ = tx.send((id, start.elapsed()));
            });
            // Let the task reach the bucket before spawning the next one.
            tokio::task::yield_now().await;
        }
        drop(tx);

        let mut admitted = Vec::new();
        while let Some(entry) = rx.recv().await {
            admitted.push(entry);
        }

        let order: Vec<i32> = admitted.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        assert!(admitted[0].1 < REFILL_PERIOD);
        assert!(admitted[1].1 < REFILL_PERIOD);
        assert!(admitted[2].1 >= REFILL_PERIOD);
        assert!(admitted[3].1 >= REFILL_PERIOD);
        assert!(admitted[4].1 >= REFILL_PERIOD * 2);
        limiter.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_rps_rounds_up() {
        let limiter = RateLimiter::new(Some(0.5));
        assert_eq!(limiter.capacity(), Some(1));
        limiter.acquire().await.unwrap();
        assert_eq!(limiter.queued(), 0);
        limiter.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_waiters() {
        let limiter = RateLimiter::new(Some(1.0));
        limiter.acquire().await.unwrap();

        let waiting = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(limiter.queued(), 1);

        limiter.stop();
        let outcome = waiting.await.unwrap();
        assert!(matches!(outcome, Err(Error::RateLimiterStopped)));
        assert!(matches!(limiter.acquire().await, Err(Error::RateLimiterStopped)));
    }
}
