//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGINT and SIGTERM handlers
//! - Turn delivery into a single store into the running flag
//!
//! # Design Decisions
//! - Uses Tokio's signal handling: the OS handler only wakes the runtime,
//!   a background task performs the store and logs afterwards
//! - Repeated signals are harmless; the flag only ever goes to false

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::ServerError;

/// Shared "keep running" flag, cleared on a stop signal.
#[derive(Debug, Clone)]
pub struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Installed signal handlers; dropping the latch uninstalls them.
#[derive(Debug)]
pub struct SignalLatch {
    task: JoinHandle<()>,
}

impl SignalLatch {
    /// Register handlers that clear `flag` on SIGINT or SIGTERM.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn install(flag: &RunningFlag) -> Result<Self, ServerError> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt =
            signal(SignalKind::interrupt()).map_err(|e| ServerError::resource("SIGINT handler", e))?;
        let mut terminate =
            signal(SignalKind::terminate()).map_err(|e| ServerError::resource("SIGTERM handler", e))?;

        let flag = flag.clone();
        let task = tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    Some(()) = interrupt.recv() => "SIGINT",
                    Some(()) = terminate.recv() => "SIGTERM",
                    else => break,
                };
                flag.stop();
                tracing::info!(signal = name, "Stop signal received");
            }
        });
        Ok(Self { task })
    }

    #[cfg(not(unix))]
    pub fn install(flag: &RunningFlag) -> Result<Self, ServerError> {
        let flag = flag.clone();
        let task = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                flag.stop();
                tracing::info!(signal = "ctrl_c", "Stop signal received");
            }
        });
        Ok(Self { task })
    }
}

impl Drop for SignalLatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
