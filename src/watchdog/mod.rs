// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright © 2024 RemasteredArch
//
// This file is part of smtp_embed.
//
// smtp_embed is free software: you can redistribute it and/or modify it under the terms of the
// GNU Affero General Public License as published by the Free Software Foundation, either version
// 3 of the License, or (at your option) any later version.
//
// smtp_embed is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See
// the GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License along with
// smtp_embed. If not, see <https://www.gnu.org/licenses/>.

//! Closes connections that have been open or idle for too long.
//!
//! See [`Watchdog`].

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError,
    },
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::{connection::ClientConnection, timeouts};

#[cfg(test)]
mod test;

/// Lists the live connections for a [`Watchdog`] to check.
pub trait ConnectionProvider: Send + Sync {
    /// Get a snapshot of the live connections.
    fn connections(&self) -> Vec<Arc<dyn ClientConnection>>;
}

type TerminatingCallback = Arc<dyn Fn(&dyn ClientConnection) + Send + Sync>;

/// Periodically disconnects every connection that has been open longer than the global
/// connection timeout, or idle longer than the idle timeout.
///
/// A timeout of [`Duration::ZERO`] disables that check. The timer only runs between
/// [`Self::start`] and [`Self::stop`], and is stopped when the [`Self`] is dropped.
pub struct Watchdog {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn ConnectionProvider>,
    /// In milliseconds.
    global_connection_timeout: AtomicU64,
    /// In milliseconds.
    connection_idle_timeout: AtomicU64,
    state: Mutex<State>,
    /// Held for the length of a sweep, so a connection is never terminated by two at once.
    sweeping: Mutex<()>,
    on_terminating: RwLock<Vec<TerminatingCallback>>,
}

struct State {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Create a stopped [`Self`] that checks the connections listed by `provider`, with the
    /// default timeouts and interval from [`crate::timeouts`].
    #[must_use]
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                global_connection_timeout: AtomicU64::new(as_millis(timeouts::GLOBAL_CONNECTION)),
                connection_idle_timeout: AtomicU64::new(as_millis(timeouts::CONNECTION_IDLE)),
                state: Mutex::new(State {
                    interval: timeouts::WATCHDOG_INTERVAL,
                    task: None,
                }),
                sweeping: Mutex::new(()),
                on_terminating: RwLock::default(),
            }),
        }
    }

    #[must_use]
    pub fn global_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.global_connection_timeout.load(Ordering::Relaxed))
    }

    pub fn set_global_connection_timeout(&self, timeout: Duration) {
        self.inner
            .global_connection_timeout
            .store(as_millis(timeout), Ordering::Relaxed);
    }

    #[must_use]
    pub fn connection_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.connection_idle_timeout.load(Ordering::Relaxed))
    }

    pub fn set_connection_idle_timeout(&self, timeout: Duration) {
        self.inner
            .connection_idle_timeout
            .store(as_millis(timeout), Ordering::Relaxed);
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.state().interval
    }

    /// Change how often connections are checked.
    ///
    /// If the timer is running, the next check happens right away, and then once every `interval`.
    /// An interval of zero is treated as one millisecond.
    pub fn set_interval(&self, interval: Duration) {
        let interval = interval.max(Duration::from_millis(1));
        let mut state = self.inner.state();
        state.interval = interval;

        if let Some(task) = state.task.take() {
            task.abort();
            state.task = Some(tokio::spawn(tick(Arc::clone(&self.inner), interval, true)));
        }
    }

    /// Start checking connections, once every [`Self::interval`]. Does nothing if already started.
    ///
    /// # Panics
    ///
    /// Panics if called from outside of a Tokio runtime.
    pub fn start(&self) {
        let mut state = self.inner.state();
        if state.task.is_some() {
            return;
        }

        tracing::debug!("Starting watchdog, checking every {:?}", state.interval);
        state.task = Some(tokio::spawn(tick(
            Arc::clone(&self.inner),
            state.interval,
            false,
        )));
    }

    /// Stop checking connections. Does nothing if already stopped.
    pub fn stop(&self) {
        if let Some(task) = self.inner.state().task.take() {
            tracing::debug!("Stopping watchdog");
            task.abort();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state().task.is_some()
    }

    /// Check every connection right now. Does nothing while stopped, or while another sweep is
    /// already checking them.
    pub fn sweep(&self) {
        if self.is_running() {
            self.inner.sweep();
        }
    }

    /// Call `callback` with every connection about to be disconnected, before it is disconnected.
    pub fn on_terminating(&self, callback: impl Fn(&dyn ClientConnection) + Send + Sync + 'static) {
        self.inner
            .on_terminating
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("global_connection_timeout", &self.global_connection_timeout())
            .field("connection_idle_timeout", &self.connection_idle_timeout())
            .field("interval", &self.interval())
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep(&self) {
        let _sweeping = match self.sweeping.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };

        let global = Duration::from_millis(self.global_connection_timeout.load(Ordering::Relaxed));
        let idle = Duration::from_millis(self.connection_idle_timeout.load(Ordering::Relaxed));

        for connection in self.provider.connections() {
            if connection.is_disconnected() {
                continue;
            }

            let reason = if !global.is_zero()
                && connection.connection_initiated().elapsed() >= global
            {
                "open too long"
            } else if !idle.is_zero() && connection.idle_time() >= idle {
                "idle too long"
            } else {
                continue;
            };

            tracing::info!(
                "Terminating connection with {} ({reason})",
                connection.remote_endpoint()
            );

            let callbacks = self
                .on_terminating
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for callback in callbacks {
                callback(connection.as_ref());
            }

            if !connection.disconnect() {
                tracing::debug!(
                    "Connection with {} was already disconnected",
                    connection.remote_endpoint()
                );
            }
        }
    }
}

/// Sweep every `interval` until aborted, optionally sweeping once right away.
async fn tick(inner: Arc<Inner>, interval: Duration, sweep_first: bool) {
    if sweep_first {
        inner.sweep();
    }

    loop {
        tokio::time::sleep(interval).await;
        inner.sweep();
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
