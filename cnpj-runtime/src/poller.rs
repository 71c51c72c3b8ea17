//! Fixed-interval background refresh.
//!
//! A [`Poller`] owns one task that fetches from a [`SnapshotSource`] on every
//! tick and delivers results through a bounded channel. Cancellation is
//! checked before every delivery, so nothing arrives after [`PollerHandle::stop`]
//! or drop. Fetch errors are logged and skipped unless the source marks them
//! fatal.

use async_trait::async_trait;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ConsoleHandle;

#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    type Snapshot: Send + 'static;
    type Error: Display + Send + 'static;

    async fn fetch(&self) -> Result<Self::Snapshot, Self::Error>;

    /// Errors that make further polling pointless (e.g. a revoked session).
    fn is_fatal(&self, _err: &Self::Error) -> bool {
        false
    }
}

/// Why the poll task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollExit {
    Cancelled,
    ReceiverDropped,
    Fatal(String),
}

#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    buffer: usize,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            buffer: 4,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Start polling. The first fetch happens immediately.
    pub fn spawn<S: SnapshotSource>(
        &self,
        handle: &ConsoleHandle,
        source: Arc<S>,
    ) -> (PollerHandle, mpsc::Receiver<S::Snapshot>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = handle.child_token();
        let task = handle.spawn(run(source, self.interval, tx, cancel.clone()));
        tracing::debug!(target: "poll", interval_ms = self.interval.as_millis() as u64, "poll.start");
        (
            PollerHandle {
                cancel,
                task: Some(task),
            },
            rx,
        )
    }
}

async fn run<S: SnapshotSource>(
    source: Arc<S>,
    interval: Duration,
    tx: mpsc::Sender<S::Snapshot>,
    cancel: CancellationToken,
) -> PollExit {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollExit::Cancelled,
            _ = ticker.tick() => {}
        }
        tick += 1;

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollExit::Cancelled,
            res = source.fetch() => res,
        };

        match fetched {
            Ok(snapshot) => {
                if cancel.is_cancelled() {
                    return PollExit::Cancelled;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return PollExit::Cancelled,
                    sent = tx.send(snapshot) => {
                        if sent.is_err() {
                            tracing::debug!(target: "poll", tick, "poll.receiver_dropped");
                            return PollExit::ReceiverDropped;
                        }
                    }
                }
                tracing::trace!(target: "poll", tick, "poll.tick.ok");
            }
            Err(err) if source.is_fatal(&err) => {
                tracing::warn!(target: "poll", tick, error = %err, "poll.tick.fatal");
                return PollExit::Fatal(err.to_string());
            }
            Err(err) => {
                tracing::warn!(target: "poll", tick, error = %err, "poll.tick.error");
            }
        }
    }
}

/// Owner of a running poll task; dropping it cancels the task.
#[derive(Debug)]
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<PollExit>>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the task to end on its own (fatal error, closed receiver or
    /// outside cancellation) without cancelling it.
    pub async fn join(mut self) -> PollExit {
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| PollExit::Fatal(e.to_string())),
            None => PollExit::Cancelled,
        }
    }

    /// Cancel and wait for the task to finish.
    pub async fn stop(self) -> PollExit {
        self.cancel.cancel();
        let exit = self.join().await;
        tracing::debug!(target: "poll", ?exit, "poll.stop");
        exit
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        calls: AtomicUsize,
        fail_on: Option<usize>,
        fatal_on: Option<usize>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
                fatal_on: None,
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for Counter {
        type Snapshot = usize;
        type Error = String;

        async fn fetch(&self) -> Result<usize, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_on {
                return Err(format!("transient {n}"));
            }
            if Some(n) == self.fatal_on {
                return Err("401".into());
            }
            Ok(n)
        }

        fn is_fatal(&self, err: &String) -> bool {
            err == "401"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_on_every_tick() {
        let handle = ConsoleHandle::current();
        let (poller, mut rx) =
            Poller::new(Duration::from_secs(5)).spawn(&handle, Arc::new(Counter::new()));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(poller.stop().await, PollExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_skipped() {
        let handle = ConsoleHandle::current();
        let source = Counter {
            fail_on: Some(2),
            ..Counter::new()
        };
        let (poller, mut rx) = Poller::new(Duration::from_secs(5)).spawn(&handle, Arc::new(source));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(3));
        poller.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_ends_polling() {
        let handle = ConsoleHandle::current();
        let source = Counter {
            fatal_on: Some(2),
            ..Counter::new()
        };
        let (poller, mut rx) = Poller::new(Duration::from_secs(5)).spawn(&handle, Arc::new(source));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
        assert_eq!(poller.join().await, PollExit::Fatal("401".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_arrives_after_stop() {
        let handle = ConsoleHandle::current();
        let source = Arc::new(Counter::new());
        let (poller, mut rx) = Poller::new(Duration::from_secs(5)).spawn(&handle, source.clone());
        assert_eq!(rx.recv().await, Some(1));
        poller.stop().await;
        let calls = source.calls.load(Ordering::SeqCst);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rx.recv().await, None);
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels() {
        let handle = ConsoleHandle::current();
        let (poller, mut rx) =
            Poller::new(Duration::from_secs(5)).spawn(&handle, Arc::new(Counter::new()));
        assert_eq!(rx.recv().await, Some(1));
        drop(poller);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_reaches_poller() {
        let handle = ConsoleHandle::current();
        let (poller, mut rx) =
            Poller::new(Duration::from_secs(5)).spawn(&handle, Arc::new(Counter::new()));
        assert_eq!(rx.recv().await, Some(1));
        handle.cancellation().cancel();
        assert!(poller.is_cancelled());
        assert_eq!(rx.recv().await, None);
        assert_eq!(poller.join().await, PollExit::Cancelled);
    }
}
