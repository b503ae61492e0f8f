//! Time-bounded script execution.
//!
//! Each invocation runs off the caller's thread and the caller waits at
//! most the configured time limit. A script that returns an error, panics
//! or overruns becomes [`Error::Script`]; an overrunning invocation is
//! abandoned and its result discarded when it eventually finishes.
//!
//! Async callers go through the blocking pool under `tokio::time::timeout`.
//! The synchronous path used during frame assembly has no runtime to lean
//! on and waits on a dedicated thread instead.

// ============================================================================
// Imports
// ============================================================================

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{trace, warn};

use crate::error::{Error, Result};

use super::ScriptResult;

// ============================================================================
// Constants
// ============================================================================

/// Default hard execution-time cap per script invocation.
pub const DEFAULT_SCRIPT_TIME_LIMIT: Duration = Duration::from_millis(1000);

// ============================================================================
// ScriptSandbox
// ============================================================================

/// Runs user scripts under a hard time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSandbox {
    /// Maximum wall-clock time per invocation.
    time_limit: Duration,
}

impl Default for ScriptSandbox {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_TIME_LIMIT)
    }
}

impl ScriptSandbox {
    /// Creates a sandbox with the given time limit.
    #[inline]
    #[must_use]
    pub const fn new(time_limit: Duration) -> Self {
        Self { time_limit }
    }

    /// Returns the time limit.
    #[inline]
    #[must_use]
    pub const fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Runs a script, blocking the current thread for at most the limit.
    ///
    /// Used from synchronous paths (frame assembly).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the script fails, panics or overruns.
    pub fn run_blocking<T, F>(&self, name: &str, script: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> ScriptResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name(format!("script-{name}"))
            .spawn(move || {
                // Receiver may be gone after an overrun.
                let _ = tx.send(script());
            })
            .map_err(|e| Error::script(name, format!("failed to start script thread: {e}")))?;

        match rx.recv_timeout(self.time_limit) {
            Ok(Ok(value)) => {
                trace!(script = name, "Script completed");
                Ok(value)
            }
            Ok(Err(message)) => Err(Error::script(name, message)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(self.overrun(name)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::script(name, "script panicked")),
        }
    }

    /// Runs a script from async code without blocking the executor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the script fails, panics or overruns.
    pub async fn run<T, F>(&self, name: &str, script: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> ScriptResult<T> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(script);

        match tokio::time::timeout(self.time_limit, task).await {
            Ok(Ok(Ok(value))) => {
                trace!(script = name, "Script completed");
                Ok(value)
            }
            Ok(Ok(Err(message))) => Err(Error::script(name, message)),
            Ok(Err(e)) if e.is_panic() => Err(Error::script(name, "script panicked")),
            Ok(Err(e)) => Err(Error::script(name, format!("script task failed: {e}"))),
            Err(_) => Err(self.overrun(name)),
        }
    }

    /// Logs and builds the overrun error.
    fn overrun(&self, name: &str) -> Error {
        warn!(
            script = name,
            limit_ms = self.time_limit.as_millis() as u64,
            "Script exceeded time limit, abandoning"
        );
        Error::script(
            name,
            format!("exceeded {}ms time limit", self.time_limit.as_millis()),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_blocking_ok() {
        let sandbox = ScriptSandbox::default();
        let value = sandbox.run_blocking("double", || Ok(21 * 2)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_run_blocking_script_error() {
        let sandbox = ScriptSandbox::default();
        let err = sandbox
            .run_blocking::<(), _>("bad", || Err("undefined is not a function".to_string()))
            .unwrap_err();
        assert!(err.is_script_error());
        assert!(err.to_string().contains("undefined is not a function"));
    }

    #[test]
    fn test_run_blocking_panic_is_contained() {
        let sandbox = ScriptSandbox::default();
        let err = sandbox
            .run_blocking::<(), _>("panics", || panic!("boom"))
            .unwrap_err();
        assert!(err.is_script_error());
    }

    #[test]
    fn test_run_blocking_time_limit() {
        let sandbox = ScriptSandbox::new(Duration::from_millis(20));
        let err = sandbox
            .run_blocking::<(), _>("spin", || {
                thread::sleep(Duration::from_millis(500));
                Ok(())
            })
            .unwrap_err();
        assert!(err.to_string().contains("time limit"));
    }

    #[tokio::test]
    async fn test_run_async() {
        let sandbox = ScriptSandbox::default();
        let value = sandbox.run("upper", || Ok("ok".to_uppercase())).await.unwrap();
        assert_eq!(value, "OK");
    }

    #[tokio::test]
    async fn test_run_async_time_limit() {
        let sandbox = ScriptSandbox::new(Duration::from_millis(20));
        let start = std::time::Instant::now();
        let err = sandbox
            .run::<(), _>("spin", || {
                thread::sleep(Duration::from_millis(500));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("time limit"));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_run_async_panic_and_error() {
        let sandbox = ScriptSandbox::default();
        let err = sandbox
            .run::<(), _>("panics", || panic!("boom"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("panicked"));

        let err = sandbox
            .run::<(), _>("bad", || Err("crc is not defined".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_script_error());
        assert!(err.to_string().contains("crc is not defined"));
    }
}
