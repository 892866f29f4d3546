//! # Window Driver
//!
//! Background thread that closes every player's time window on a fixed
//! cadence. Each tick either hands the closed windows to a sink (leaderboards,
//! activity summaries) or simply discards them.
//!
//! ```text
//!   WindowDriver thread
//!   ┌──────────────────────────────────────────┐
//!   │ loop select! {                           │
//!   │   ticker (every interval) -> take/reset  │
//!   │   stop (signal or closed) -> exit        │
//!   │ }                                        │
//!   └──────────────────────────────────────────┘
//! ```
//!
//! Ticks follow a fixed schedule from the start time, so a slow sink does
//! not push later ticks back. Stopping is prompt: the thread wakes on the
//! stop signal instead of sleeping out the interval.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};

use crate::entry::PlayerId;
use crate::error::{LedgerError, LedgerResult};
use crate::registry::LedgerRegistry;
use crate::window::WindowSnapshot;

/// Handle to a running window driver. Dropping it stops the thread.
#[derive(Debug)]
pub struct WindowDriver {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WindowDriver {
    /// Starts a driver that passes each closed window to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidConfig`] for a zero interval and
    /// [`LedgerError::Driver`] if the thread cannot be spawned.
    pub fn spawn<F>(registry: Arc<LedgerRegistry>, interval: Duration, mut sink: F) -> LedgerResult<Self>
    where
        F: FnMut(PlayerId, WindowSnapshot) + Send + 'static,
    {
        Self::start(interval, move || {
            let windows = registry.take_all_windows();
            let count = windows.len();
            for (id, window) in windows {
                sink(id, window);
            }
            tracing::debug!(entries = count, "windows closed");
        })
    }

    /// Starts a driver that resets every window without reporting it.
    ///
    /// # Errors
    ///
    /// Same as [`WindowDriver::spawn`].
    pub fn spawn_discarding(registry: Arc<LedgerRegistry>, interval: Duration) -> LedgerResult<Self> {
        Self::start(interval, move || registry.reset_all_windows())
    }

    fn start<T>(interval: Duration, tick: T) -> LedgerResult<Self>
    where
        T: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(LedgerError::InvalidConfig(
                "window interval must be greater than 0".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let thread = std::thread::Builder::new()
            .name("quarry-window-driver".to_string())
            .spawn(move || Self::run(&stop_rx, interval, tick))
            .map_err(|e| LedgerError::Driver(format!("failed to spawn thread: {e}")))?;

        tracing::info!(?interval, "window driver started");
        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn run<T: FnMut()>(stop: &Receiver<()>, interval: Duration, mut tick: T) {
        let ticker = crossbeam_channel::tick(interval);
        loop {
            select! {
                recv(ticker) -> _ => tick(),
                recv(stop) -> _ => break,
            }
        }
    }

    /// Returns true while the driver thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signals the thread and waits for it to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // A closed channel also stops the loop.
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("window driver thread panicked");
            } else {
                tracing::info!("window driver stopped");
            }
        }
    }
}

impl Drop for WindowDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
