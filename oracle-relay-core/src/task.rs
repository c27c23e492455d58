use std::collections::VecDeque;
use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use futures::future::{self, Either};
use oracle_relay_logging::LOG_TASK;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::runtime::{self, JoinError, JoinHandle};

#[derive(Debug)]
struct TaskGroupInner {
    on_shutdown_tx: watch::Sender<bool>,
    // At least one `Receiver` must stay alive, otherwise shutdown writes are
    // lost.
    on_shutdown_rx: watch::Receiver<bool>,
    // blocking Mutex, `spawn` never yields while holding it
    join: std::sync::Mutex<VecDeque<(String, JoinHandle<()>)>>,
}

impl Default for TaskGroupInner {
    fn default() -> Self {
        let (on_shutdown_tx, on_shutdown_rx) = watch::channel(false);
        Self {
            on_shutdown_tx,
            on_shutdown_rx,
            join: std::sync::Mutex::new(VecDeque::new()),
        }
    }
}

/// A group of tasks working together
///
/// Every task spawned on the group observes the same shutdown signal. The
/// relay service runs its control loop inside a group so that cancelling
/// the group stops the loop, and any blocking RPC call inside it, at the
/// next await point.
#[derive(Clone, Default, Debug)]
pub struct TaskGroup {
    inner: Arc<TaskGroupInner>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_handle(&self) -> TaskHandle {
        TaskHandle {
            inner: self.inner.clone(),
        }
    }

    pub fn shutdown(&self) {
        // send_replace never fails, `on_shutdown_rx` keeps the channel open
        self.inner.on_shutdown_tx.send_replace(true);
    }

    pub async fn shutdown_join_all(
        self,
        join_timeout: impl Into<Option<Duration>>,
    ) -> anyhow::Result<()> {
        self.shutdown();
        self.join_all(join_timeout.into()).await
    }

    /// Spawn a task, the returned receiver fires once with its result
    pub fn spawn<Fut, R>(
        &self,
        name: impl Into<String>,
        f: impl FnOnce(TaskHandle) -> Fut + Send + 'static,
    ) -> oneshot::Receiver<R>
    where
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let name = name.into();
        let span = info_span!("task", name = %name);
        let handle = self.make_handle();

        let (tx, rx) = oneshot::channel();
        let join = runtime::spawn(&name, {
            let name = name.clone();
            async move {
                debug!(target: LOG_TASK, "Starting task {name}");
                let r = f(handle).await;
                debug!(target: LOG_TASK, "Finished task {name}");
                // receiver may not be interested
                let _ = tx.send(r);
            }
            .instrument(span)
        });
        self.inner
            .join
            .lock()
            .expect("lock poison")
            .push_back((name, join));

        rx
    }

    pub async fn join_all(self, timeout: Option<Duration>) -> anyhow::Result<()> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut errors: Vec<JoinError> = vec![];

        // drop lock early
        while let Some((name, join)) = {
            let mut lock = self.inner.join.lock().expect("lock poison");
            lock.pop_front()
        } {
            debug!(target: LOG_TASK, task = %name, "Waiting for task to finish");

            let join_future: Pin<Box<dyn Future<Output = _> + Send>> = match deadline {
                Some(deadline) => Box::pin(runtime::timeout(
                    deadline
                        .checked_duration_since(Instant::now())
                        .unwrap_or(Duration::from_millis(10)),
                    join,
                )),
                None => Box::pin(async move { Ok(join.await) }),
            };

            match join_future.await {
                Ok(Ok(())) => {
                    debug!(target: LOG_TASK, task = %name, "Task finished");
                }
                Ok(Err(e)) => {
                    error!(target: LOG_TASK, task = %name, error = %e, "Task panicked");
                    errors.push(e);
                }
                Err(_) => {
                    warn!(target: LOG_TASK, task = %name, "Timeout waiting for task to shut down");
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            let num_errors = errors.len();
            bail!("{num_errors} tasks did not finish cleanly: {errors:?}")
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaskHandle {
    inner: Arc<TaskGroupInner>,
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("Task group is shutting down")]
#[non_exhaustive]
pub struct ShuttingDownError {}

impl TaskHandle {
    /// Future that resolves once the group shuts down
    pub fn make_shutdown_rx(&self) -> TaskShutdownToken {
        TaskShutdownToken::new(self.inner.on_shutdown_rx.clone())
    }

    /// Run the future or cancel it if the [`TaskGroup`] shuts down.
    pub async fn cancel_on_shutdown<F: Future>(
        &self,
        fut: F,
    ) -> Result<F::Output, ShuttingDownError> {
        let rx = self.make_shutdown_rx();
        match future::select(pin!(rx), pin!(fut)).await {
            Either::Left(((), _)) => Err(ShuttingDownError {}),
            Either::Right((value, _)) => Ok(value),
        }
    }
}

pub struct TaskShutdownToken(Pin<Box<dyn Future<Output = ()> + Send>>);

impl TaskShutdownToken {
    fn new(mut rx: watch::Receiver<bool>) -> Self {
        Self(Box::pin(async move {
            let _ = rx.wait_for(|v| *v).await;
        }))
    }
}

impl Future for TaskShutdownToken {
    type Output = ();

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests;
