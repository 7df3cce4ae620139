//! Owned background tasks.
//!
//! A `TaskGuard` aborts its task when dropped, so timers stored in a device
//! entry can never outlive the entry.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

#[derive(Debug)]
pub struct TaskGuard {
    handle: JoinHandle<()>,
}

impl TaskGuard {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    /// Runs `action` once after `delay`.
    pub fn after<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(async move {
            sleep(delay).await;
            action().await;
        })
    }

    /// Runs `action` every `period`, first after one full period.
    pub fn every<F, Fut>(period: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                action().await;
            }
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
