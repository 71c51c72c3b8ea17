//! Tokio runtime ownership and shutdown for the console.
//!
//! [`ConsoleRuntime`] is built once in `main`; everything else gets a
//! [`ConsoleHandle`] and spawns through it so that one cancellation token
//! reaches every background task (see [`poller`]).

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod poller;

pub use poller::{PollExit, Poller, PollerHandle, SnapshotSource};

pub struct ConsoleRuntime {
    runtime: Runtime,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct ConsoleHandle {
    inner: Handle,
    cancel: CancellationToken,
}

impl ConsoleRuntime {
    /// Multi-threaded runtime with IO and timers enabled.
    ///
    /// ```
    /// use cnpj_runtime::ConsoleRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = ConsoleRuntime::build("doctest-runtime", Some(1))
    ///     .expect("runtime builds");
    /// assert_eq!(runtime.block_on(async { 2 + 2 }), 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);
        if let Some(n) = worker_threads {
            builder.worker_threads(n.max(1));
        }
        let runtime = builder
            .build()
            .with_context(|| format!("starting tokio runtime {thread_name}"))?;
        Ok(Self {
            runtime,
            cancel: CancellationToken::new(),
        })
    }

    pub fn handle(&self) -> ConsoleHandle {
        ConsoleHandle {
            inner: self.runtime.handle().clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Cancel every task spawned through a handle, then wait up to `grace`.
    pub fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        self.runtime.shutdown_timeout(grace);
        tracing::debug!(grace_ms = grace.as_millis() as u64, "runtime.shutdown");
    }
}

impl ConsoleHandle {
    /// Handle on the ambient runtime with a fresh token. Panics outside Tokio.
    pub fn current() -> Self {
        Self {
            inner: Handle::current(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    /// The console-wide token.
    ///
    /// ```
    /// use cnpj_runtime::ConsoleRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = ConsoleRuntime::build("cancel-example", Some(1)).unwrap();
    /// let handle = runtime.handle();
    /// let child = handle.child_token();
    /// handle.cancellation().cancel();
    /// assert!(child.is_cancelled());
    /// runtime.shutdown(Duration::from_millis(5));
    /// ```
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancelled along with the console, or on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Resolves on Ctrl-C or when the console is cancelled, whichever is first.
    /// A Ctrl-C also cancels the console token. Without signal support only
    /// cancellation counts.
    pub async fn shutdown_requested(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => {
                    tracing::info!("runtime.ctrl_c");
                    self.cancel.cancel();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "runtime.ctrl_c.unavailable");
                    self.cancel.cancelled().await;
                }
            },
        }
    }
}
