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

//! Tests for [`super`].

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicUsize},
};

use tokio::time::{sleep, Instant};

use super::*;
use crate::session::ActivityClock;

/// A connection that only records what happens to it.
struct FakeConnection {
    initiated: Instant,
    activity: ActivityClock,
    disconnects: AtomicUsize,
    disconnected: AtomicBool,
}

impl FakeConnection {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            initiated: Instant::now(),
            activity: ActivityClock::new(),
            disconnects: AtomicUsize::new(0),
            disconnected: AtomicBool::new(false),
        })
    }

    fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl ClientConnection for FakeConnection {
    fn remote_endpoint(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 30_000))
    }

    fn connection_initiated(&self) -> Instant {
        self.initiated
    }

    fn idle_time(&self) -> Duration {
        self.activity.idle_time()
    }

    fn disconnect(&self) -> bool {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        !self.disconnected.swap(true, Ordering::SeqCst)
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

struct FakeProvider(Vec<Arc<FakeConnection>>);

impl ConnectionProvider for FakeProvider {
    fn connections(&self) -> Vec<Arc<dyn ClientConnection>> {
        self.0
            .iter()
            .map(|connection| Arc::clone(connection) as Arc<dyn ClientConnection>)
            .collect()
    }
}

/// A stopped watchdog over `connections`, counting its terminating events.
fn watchdog(
    connections: &[Arc<FakeConnection>],
    global: Duration,
    idle: Duration,
) -> (Watchdog, Arc<AtomicUsize>) {
    let watchdog = Watchdog::new(Arc::new(FakeProvider(connections.to_vec())));
    watchdog.set_global_connection_timeout(global);
    watchdog.set_connection_idle_timeout(idle);

    let terminations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&terminations);
    watchdog.on_terminating(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    (watchdog, terminations)
}

fn secs(secs: f64) -> Duration {
    Duration::from_secs_f64(secs)
}

#[test]
fn test_defaults() {
    let watchdog = Watchdog::new(Arc::new(FakeProvider(Vec::new())));

    assert_eq!(watchdog.global_connection_timeout(), timeouts::GLOBAL_CONNECTION);
    assert_eq!(watchdog.connection_idle_timeout(), timeouts::CONNECTION_IDLE);
    assert_eq!(watchdog.interval(), timeouts::WATCHDOG_INTERVAL);
    assert!(!watchdog.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout() {
    let idle = FakeConnection::new();
    let busy = FakeConnection::new();
    let (watchdog, terminations) =
        watchdog(&[idle.clone(), busy.clone()], Duration::ZERO, secs(5.0));
    watchdog.start();

    for _ in 0..9 {
        sleep(secs(0.5)).await;
        busy.activity.touch();
    }
    assert_eq!(idle.disconnects(), 0);

    sleep(secs(1.0)).await;
    busy.activity.touch();
    assert_eq!(idle.disconnects(), 1);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);

    // Already disconnected connections are left alone.
    for _ in 0..6 {
        sleep(secs(0.5)).await;
        busy.activity.touch();
    }
    assert_eq!(idle.disconnects(), 1);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert_eq!(busy.disconnects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_global_timeout() {
    let connection = FakeConnection::new();
    let (watchdog, terminations) = watchdog(&[connection.clone()], secs(3.0), Duration::ZERO);
    watchdog.start();

    for _ in 0..5 {
        sleep(secs(0.5)).await;
        connection.activity.touch();
    }
    assert_eq!(connection.disconnects(), 0);

    sleep(secs(1.0)).await;
    assert_eq!(connection.disconnects(), 1);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_disables() {
    let connection = FakeConnection::new();
    let (watchdog, terminations) =
        watchdog(&[connection.clone()], Duration::ZERO, Duration::ZERO);
    watchdog.start();

    sleep(secs(3_600.0)).await;
    assert_eq!(connection.disconnects(), 0);
    assert_eq!(terminations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stopped() {
    let connection = FakeConnection::new();
    let (watchdog, terminations) = watchdog(&[connection.clone()], Duration::ZERO, secs(1.0));

    watchdog.start();
    watchdog.stop();
    watchdog.stop();
    assert!(!watchdog.is_running());

    sleep(secs(10.0)).await;
    watchdog.sweep();
    assert_eq!(connection.disconnects(), 0);
    assert_eq!(terminations.load(Ordering::SeqCst), 0);

    watchdog.start();
    watchdog.sweep();
    assert_eq!(connection.disconnects(), 1);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice() {
    let connection = FakeConnection::new();
    let (watchdog, _) = watchdog(&[connection.clone()], Duration::ZERO, secs(1.0));

    watchdog.start();
    watchdog.start();
    assert!(watchdog.is_running());

    sleep(secs(1.5)).await;
    assert_eq!(connection.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_set_interval() {
    let connection = FakeConnection::new();
    let (watchdog, _) = watchdog(&[connection.clone()], Duration::ZERO, secs(1.0));
    watchdog.set_interval(secs(10.0));
    assert_eq!(watchdog.interval(), secs(10.0));

    watchdog.start();
    sleep(secs(2.0)).await;
    assert_eq!(connection.disconnects(), 0);

    // Checks right away instead of waiting out the old interval.
    watchdog.set_interval(secs(60.0));
    sleep(secs(0.001)).await;
    assert_eq!(connection.disconnects(), 1);
    assert!(watchdog.is_running());

    // Zero would spin.
    watchdog.set_interval(Duration::ZERO);
    assert_eq!(watchdog.interval(), Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn test_set_interval_while_stopped() {
    let connection = FakeConnection::new();
    let (watchdog, _) = watchdog(&[connection.clone()], Duration::ZERO, secs(1.0));

    watchdog.set_interval(secs(2.0));
    assert!(!watchdog.is_running());

    sleep(secs(5.0)).await;
    assert_eq!(connection.disconnects(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_sweeps() {
    let connection = FakeConnection::new();
    let (watchdog, terminations) =
        watchdog(&[connection.clone()], Duration::ZERO, Duration::from_millis(1));
    // Keeps the first sweep busy while the others start.
    watchdog.on_terminating(|_| std::thread::sleep(Duration::from_millis(50)));
    watchdog.set_interval(secs(3_600.0));

    std::thread::sleep(Duration::from_millis(10));
    watchdog.start();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| watchdog.sweep());
        }
    });

    assert_eq!(connection.disconnects(), 1);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_from_terminating() {
    let connection = FakeConnection::new();
    let (watchdog, terminations) = watchdog(&[connection.clone()], Duration::ZERO, secs(1.0));
    let watchdog = Arc::new(watchdog);

    let nested = Arc::downgrade(&watchdog);
    watchdog.on_terminating(move |_| {
        if let Some(watchdog) = nested.upgrade() {
            watchdog.sweep();
        }
    });

    watchdog.start();
    sleep(secs(2.0)).await;
    watchdog.sweep();

    assert_eq!(connection.disconnects(), 1);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
}
