//! Cancellable background refresh tasks.
//!
//! Every fetch runs inside the task that owns its timer, so stopping the
//! handle also drops a request that is still in flight; a stale response can
//! never be written back after teardown.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Owns one scheduled task. Stopping or dropping the handle cancels it.
#[derive(Debug)]
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
    live: Arc<AtomicBool>,
}

impl PollHandle {
    fn spawn<Fut>(live: Arc<AtomicBool>, body: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(body)),
            live,
        }
    }

    /// Cancels the task. Idempotent.
    pub fn stop(&mut self) {
        self.live.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.live.load(Ordering::Acquire)
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs `callback` immediately and then every `period` until stopped.
///
/// A slow callback delays the following tick instead of causing a burst.
pub fn poll_every<F, Fut>(period: Duration, mut callback: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let live = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&live);
    PollHandle::spawn(live, async move {
        let mut ticker = time::interval(period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !flag.load(Ordering::Acquire) {
                break;
            }
            callback().await;
        }
    })
}

/// Runs `callback` once after `delay` unless stopped first.
pub fn run_after<F, Fut>(delay: Duration, callback: F) -> PollHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let live = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&live);
    PollHandle::spawn(live, async move {
        time::sleep(delay).await;
        if flag.load(Ordering::Acquire) {
            callback().await;
        }
        flag.store(false, Ordering::Release);
    })
}

/// Holds at most one live task, restarting it only when its dependency key
/// changes.
#[derive(Debug)]
pub struct PollSlot<K> {
    key: Option<K>,
    handle: Option<PollHandle>,
}

impl<K> Default for PollSlot<K> {
    fn default() -> Self {
        Self {
            key: None,
            handle: None,
        }
    }
}

impl<K: PartialEq> PollSlot<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a task for `key` unless one was already started for an equal
    /// key. The previous task is stopped before the new one starts. Returns
    /// whether a task was (re)started.
    pub fn ensure(&mut self, key: K, start: impl FnOnce() -> PollHandle) -> bool {
        if self.key.as_ref() == Some(&key) && self.handle.is_some() {
            return false;
        }
        self.stop();
        self.handle = Some(start());
        self.key = Some(key);
        true
    }

    /// Forces a restart with the current key on the next [`ensure`](Self::ensure).
    pub fn invalidate(&mut self) {
        self.stop();
    }

    pub fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
        }
        self.key = None;
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(PollHandle::is_running)
    }
}
