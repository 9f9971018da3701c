//! OS signal wiring.
//!
//! The engine only knows about [`StopHandle`]. This module bridges process
//! termination signals to it on a helper thread running a small tokio
//! runtime, so the host decides whether signals are handled at all.

use crate::error::{SyncError, SyncResult};
use crate::stop::StopHandle;
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the listener checks whether a stop arrived by other means.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Signal number of SIGABRT on every unix tokio supports.
#[cfg(unix)]
const SIGABRT: i32 = 6;

/// Spawns a thread that calls `stop` on SIGINT/SIGTERM/SIGABRT (Ctrl-C
/// elsewhere).
///
/// The thread exits after the first signal or as soon as a stop is
/// requested through any other handle.
pub fn spawn_signal_listener(stop: StopHandle) -> SyncResult<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SyncError::Signal(e.to_string()))?;

    let handle = std::thread::Builder::new()
        .name("apollo-sync-signals".into())
        .spawn(move || {
            runtime.block_on(async move {
                tokio::select! {
                    received = wait_for_termination() => match received {
                        Ok(signal) => {
                            tracing::info!(signal, "termination signal received, stopping listener");
                            stop.stop();
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "could not listen for termination signals");
                        }
                    },
                    _ = wait_until_stopped(&stop) => {
                        tracing::debug!("signal listener exiting");
                    }
                }
            });
        })?;

    Ok(handle)
}

async fn wait_until_stopped(stop: &StopHandle) {
    let mut interval = tokio::time::interval(STOP_CHECK_INTERVAL);
    while !stop.is_stopping() {
        interval.tick().await;
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut abort = signal(SignalKind::from_raw(SIGABRT))?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = abort.recv() => Ok("SIGABRT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
