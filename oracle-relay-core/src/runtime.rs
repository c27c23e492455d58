//! Thin wrappers over the tokio executor so call sites don't reach for tokio
//! directly.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Error)]
#[error("deadline has elapsed")]
pub struct Elapsed;

pub fn spawn<F, T>(name: &str, future: F) -> JoinHandle<T>
where
    F: Future<Output = T> + 'static + Send,
    T: Send + 'static,
{
    tracing::trace!(target: oracle_relay_logging::LOG_TASK, task = %name, "Spawning task");
    tokio::spawn(future)
}

pub async fn sleep(duration: Duration) {
    // nosemgrep: ban-tokio-sleep
    tokio::time::sleep(duration).await;
}

pub async fn timeout<T>(duration: Duration, future: T) -> Result<T::Output, Elapsed>
where
    T: Future,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| Elapsed)
}
