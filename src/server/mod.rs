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

//! Accepts connections and runs an SMTP session on each of them.
//!
//! See [`SmtpServer`].

use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use async_stream::stream;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    command::Dispatcher,
    config::Configuration,
    connection::{ClientConnection, CloseReason, Connection, ConnectionHandle},
    responder::Responders,
    timeouts,
    watchdog::Watchdog,
    Error, Response, Result, Session,
};

mod registry;

pub use registry::Registry;

type SessionCallback = Arc<dyn Fn(&Session) + Send + Sync>;

/// Callbacks for things that happen to every connection.
#[derive(Default)]
struct Events {
    client_connected: Vec<SessionCallback>,
    greeting_sent: Vec<SessionCallback>,
    client_disconnected: Vec<SessionCallback>,
}

/// An SMTP server, listening on any number of addresses.
///
/// Cloning a [`Self`] gives another handle to the same server. Listeners keep running until
/// [`Self::shutdown`], even after every handle is dropped.
#[derive(Clone)]
pub struct SmtpServer {
    shared: Arc<Shared>,
}

struct Shared {
    config: Arc<Configuration>,
    dispatcher: Dispatcher,
    registry: Arc<Registry>,
    watchdog: Watchdog,
    shutdown: CancellationToken,
    local_addrs: Mutex<Vec<SocketAddr>>,
    events: RwLock<Events>,
}

impl SmtpServer {
    /// Create a [`Self`] that is not listening anywhere yet.
    ///
    /// The watchdog follows changes to the timeouts in `config`.
    #[must_use]
    pub fn new(config: Arc<Configuration>, responders: Responders) -> Self {
        let registry = Arc::new(Registry::new());
        let watchdog = Watchdog::new(registry.clone());

        let settings = config.settings();
        watchdog.set_global_connection_timeout(settings.global_connection_timeout);
        watchdog.set_connection_idle_timeout(settings.connection_idle_timeout);

        let shared = Arc::new(Shared {
            config: Arc::clone(&config),
            dispatcher: Dispatcher::new(responders),
            registry,
            watchdog,
            shutdown: CancellationToken::new(),
            local_addrs: Mutex::default(),
            events: RwLock::default(),
        });

        let weak = Arc::downgrade(&shared);
        config.subscribe(move |settings| {
            if let Some(shared) = weak.upgrade() {
                shared
                    .watchdog
                    .set_global_connection_timeout(settings.global_connection_timeout);
                shared
                    .watchdog
                    .set_connection_idle_timeout(settings.connection_idle_timeout);
            }
        });

        Self { shared }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Configuration> {
        &self.shared.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    #[must_use]
    pub fn watchdog(&self) -> &Watchdog {
        &self.shared.watchdog
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Get a snapshot of the live connections.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.shared.registry.snapshot()
    }

    /// Get the address of every listener started by [`Self::bind`].
    #[must_use]
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.shared
            .local_addrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Call `callback` when a client connects, before the greeting is sent.
    pub fn on_client_connected(&self, callback: impl Fn(&Session) + Send + Sync + 'static) {
        self.shared.events_mut().client_connected.push(Arc::new(callback));
    }

    /// Call `callback` right after the greeting is sent to a new client.
    pub fn on_greeting_sent(&self, callback: impl Fn(&Session) + Send + Sync + 'static) {
        self.shared.events_mut().greeting_sent.push(Arc::new(callback));
    }

    /// Call `callback` once for every connection, after it is closed and unregistered.
    pub fn on_client_disconnected(&self, callback: impl Fn(&Session) + Send + Sync + 'static) {
        self.shared
            .events_mut()
            .client_disconnected
            .push(Arc::new(callback));
    }

    /// Call `callback` when the watchdog is about to close a connection.
    ///
    /// See [`Watchdog::on_terminating`].
    pub fn on_terminating(
        &self,
        callback: impl Fn(&dyn ClientConnection) + Send + Sync + 'static,
    ) {
        self.shared.watchdog.on_terminating(callback);
    }

    /// Start listening for connections on `addr`, returning the address actually bound.
    ///
    /// The first successful call also starts the watchdog.
    pub async fn bind(&self, addr: impl ToSocketAddrs) -> Result<SocketAddr> {
        if self.shared.shutdown.is_cancelled() {
            return Err(Error::ShutDown);
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        self.shared
            .local_addrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(local_addr);
        self.shared.watchdog.start();

        tracing::info!("Started listening on {local_addr}");
        tokio::spawn(listen(Arc::clone(&self.shared), listener, local_addr));

        Ok(local_addr)
    }

    /// Run an SMTP session over `stream`, as if it had been accepted from `remote`.
    ///
    /// For embedders that accept connections themselves, or that are not using TCP at all.
    pub fn serve<S>(&self, stream: S, remote: SocketAddr) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Shared::spawn_connection(&self.shared, stream, remote)
    }

    /// Stop every listener and the watchdog, and disconnect every live connection.
    ///
    /// Connections are closed by their own tasks, shortly after this returns.
    pub fn shutdown(&self) {
        if self.shared.shutdown.is_cancelled() {
            return;
        }

        tracing::info!("Shutting down");
        self.shared.shutdown.cancel();
        self.shared.watchdog.stop();

        for handle in self.shared.registry.snapshot() {
            handle.disconnect();
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for SmtpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpServer")
            .field("config", &self.shared.config)
            .field("watchdog", &self.shared.watchdog)
            .field("local_addrs", &self.local_addrs())
            .field("connections", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn events_mut(&self) -> std::sync::RwLockWriteGuard<'_, Events> {
        self.events.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call every callback chosen by `select`, without holding the lock while doing so.
    fn emit(&self, select: impl FnOnce(&Events) -> &Vec<SessionCallback>, session: &Session) {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let callbacks = select(&events).clone();
        drop(events);

        for callback in callbacks {
            callback(session);
        }
    }

    fn spawn_connection<S>(shared: &Arc<Self>, stream: S, remote: SocketAddr) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let span = tracing::info_span!("smtp_connection", remote = %remote);
        let connection = Connection::new(stream, remote);

        tokio::spawn(handle_connection(Arc::clone(shared), connection).instrument(span))
    }
}

/// Accept connections from `listener` until the server shuts down.
async fn listen(shared: Arc<Shared>, listener: TcpListener, local_addr: SocketAddr) {
    let incoming = incoming(listener);
    pin_mut!(incoming);

    loop {
        let accepted = tokio::select! {
            () = shared.shutdown.cancelled() => break,
            accepted = incoming.next() => accepted,
        };

        match accepted {
            Some(Ok((stream, remote))) => {
                Shared::spawn_connection(&shared, stream, remote);
            }
            Some(Err(err)) => tracing::warn!("Failed to accept connection: {err}"),
            None => break,
        }
    }

    tracing::info!("Stopped listening on {local_addr}");
}

/// Turn `listener` into a stream of accepted connections.
fn incoming(listener: TcpListener) -> impl Stream<Item = io::Result<(TcpStream, SocketAddr)>> {
    stream! {
        loop {
            yield listener.accept().await;
        }
    }
}

/// Run one SMTP session from greeting to teardown.
async fn handle_connection<S>(shared: Arc<Shared>, mut connection: Connection<S>)
where
    S: AsyncRead + AsyncWrite + Send,
{
    let handle = Arc::clone(connection.handle());
    if let Some(replaced) = shared.registry.insert(Arc::clone(&handle)) {
        replaced.disconnect();
    }
    if shared.shutdown.is_cancelled() {
        handle.disconnect();
    }

    tracing::info!("Connection opened");
    shared.emit(|events| &events.client_connected, connection.session());

    let greeting = Response::new(220, shared.config.default_greeting());
    if let Err(err) = connection.write_response(&greeting).await {
        tracing::warn!("Failed to send greeting: {err}");
    }
    shared.emit(|events| &events.greeting_sent, connection.session());

    let close_reason = connection.run(&shared.dispatcher).await;
    if close_reason == CloseReason::Quit {
        tokio::time::sleep(timeouts::DISCONNECT_GRACE).await;
    }

    connection.disconnect().await;
    shared.registry.remove(&handle);

    tracing::info!("Connection closed ({close_reason:?})");
    shared.emit(|events| &events.client_disconnected, connection.session());
}
