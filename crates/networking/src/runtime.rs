//! Runtime management for driving requests from synchronous code.
//!
//! Requests are plain futures. Async callers simply `.await` them; tests and
//! other synchronous callers use [`block_on_timeout`] to wait for a result
//! with an upper bound.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};

use crate::error::{NetworkingError, Result, TIMED_OUT_CODE};

/// How long [`block_on_timeout`] waits by default.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(60);

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get the global runtime, creating it on first use.
pub fn get() -> Result<&'static Runtime> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("networking-runtime")
        .enable_all()
        .build()?;
    // Another thread may have won the race; either runtime is fine.
    let _ = RUNTIME.set(runtime);

    RUNTIME.get().ok_or_else(|| NetworkingError::UnexpectedError {
        status_code: None,
        message: "Failed to initialize the async runtime".to_string(),
    })
}

/// Spawn a future on the current runtime, or on the global one when called
/// outside of a runtime.
pub fn spawn<F>(future: F) -> Result<tokio::task::JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Ok(handle.spawn(future)),
        Err(_) => Ok(get()?.spawn(future)),
    }
}

/// Block the calling thread on `future` using the global runtime.
///
/// # Errors
///
/// Fails when called from within an async context, where blocking would
/// stall the executor.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    if Handle::try_current().is_ok() {
        return Err(NetworkingError::UnexpectedError {
            status_code: None,
            message: "block_on called from within an async runtime".to_string(),
        });
    }
    Ok(get()?.block_on(future))
}

/// Like [`block_on`], but gives up after `wait`.
pub fn block_on_timeout<F: Future>(future: F, wait: Duration) -> Result<F::Output> {
    block_on(async move { tokio::time::timeout(wait, future).await })?.map_err(|_| {
        NetworkingError::UnexpectedError {
            status_code: Some(TIMED_OUT_CODE),
            message: format!("Gave up waiting after {wait:?}"),
        }
    })
}
