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

//! Handles byte streams as SMTP sessions.
//!
//! See [`Connection::run`].

use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures_util::{pin_mut, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    command::Dispatcher,
    decoder::{DecoderEvent, RawLineDecoder},
    line::LineFramer,
    session::{ActivityClock, Session},
    Response,
};

#[cfg(test)]
mod test;

/// What the [`crate::watchdog::Watchdog`] needs to know about a live connection.
pub trait ClientConnection: Send + Sync {
    fn remote_endpoint(&self) -> SocketAddr;

    /// Get the instant the connection was accepted.
    fn connection_initiated(&self) -> Instant;

    /// Get how long it has been since the client last sent a line.
    fn idle_time(&self) -> Duration;

    /// Ask for the connection to be closed. Must be safe to call more than once.
    ///
    /// Returns `true` only for the call that actually did it.
    fn disconnect(&self) -> bool;

    fn is_disconnected(&self) -> bool {
        false
    }
}

/// The shareable face of a [`Connection`], held by the server's registry and the watchdog.
#[derive(Debug)]
pub struct ConnectionHandle {
    remote: SocketAddr,
    initiated: Instant,
    activity: Arc<ActivityClock>,
    closed: AtomicBool,
    cancellation: CancellationToken,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(remote: SocketAddr, activity: Arc<ActivityClock>) -> Self {
        Self {
            remote,
            initiated: Instant::now(),
            activity,
            closed: AtomicBool::new(false),
            cancellation: CancellationToken::new(),
        }
    }

    /// Get the token that is cancelled by [`Self::disconnect`].
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Stop the connection's task, which then closes the stream.
    ///
    /// Returns `true` only for the call that actually did it.
    pub fn disconnect(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.cancellation.cancel();
        true
    }
}

impl ClientConnection for ConnectionHandle {
    fn remote_endpoint(&self) -> SocketAddr {
        self.remote
    }

    fn connection_initiated(&self) -> Instant {
        self.initiated
    }

    fn idle_time(&self) -> Duration {
        self.activity.idle_time()
    }

    fn disconnect(&self) -> bool {
        Self::disconnect(self)
    }

    fn is_disconnected(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Writes whole lines to a stream.
#[derive(Debug)]
pub struct LineWriter<W> {
    writer: W,
    shut_down: bool,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            shut_down: false,
        }
    }

    /// Write `line`, which should already end in `CRLF`, and flush it.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        tracing::debug!(">>> {}", line.trim_end());

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    /// Write every line of `response`. Writes nothing for [`Response::NONE`].
    ///
    /// See [`Response::to_wire`].
    pub async fn write_response(&mut self, response: &Response) -> io::Result<()> {
        for line in response.to_wire() {
            self.write_line(&line).await?;
        }

        Ok(())
    }

    /// Like [`Self::write_response`], but gives up once `cancellation` is cancelled.
    ///
    /// Whatever was not written yet is dropped.
    ///
    /// # Errors
    ///
    /// [`io::ErrorKind::ConnectionAborted`] if cancelled before the whole response was written.
    pub async fn write_response_until(
        &mut self,
        response: &Response,
        cancellation: &CancellationToken,
    ) -> io::Result<()> {
        tokio::select! {
            biased;
            result = self.write_response(response) => result,
            () = cancellation.cancelled() => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "disconnected while writing",
            )),
        }
    }

    /// Close the stream for writing. Does nothing after the first call.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        if self.shut_down {
            return Ok(());
        }

        self.shut_down = true;
        self.writer.shutdown().await
    }

    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

/// Indicates why [`Connection::run`] returned.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum CloseReason {
    /// The server replied with `221`, usually to `QUIT`.
    Quit,
    /// The client closed the stream.
    ClosedByClient,
    /// Reading from the stream failed.
    Lost,
    /// [`ConnectionHandle::disconnect`] was called, by the watchdog or by the server.
    Disconnected,
}

/// A byte stream carrying one SMTP session.
pub struct Connection<S> {
    decoder: RawLineDecoder<LineFramer<ReadHalf<S>>>,
    writer: LineWriter<WriteHalf<S>>,
    session: Session,
    handle: Arc<ConnectionHandle>,
}

impl<S: AsyncRead + AsyncWrite + Send> Connection<S> {
    /// Create a [`Self`] for a client connecting from `remote`.
    pub fn new(stream: S, remote: SocketAddr) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let session = Session::new(remote);
        let handle = Arc::new(ConnectionHandle::new(
            remote,
            Arc::clone(session.activity()),
        ));
        let decoder = RawLineDecoder::with_parent(
            LineFramer::with_default_buffer(reader),
            handle.cancellation().clone(),
        );

        Self {
            decoder,
            writer: LineWriter::new(writer),
            session,
            handle,
        }
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    #[must_use]
    pub const fn remote(&self) -> SocketAddr {
        self.session.remote()
    }

    /// Get how long it has been since the client last sent a line.
    ///
    /// See [`Session::idle_time`].
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.session.idle_time()
    }

    /// Write `response`, giving up if the connection is disconnected first.
    ///
    /// See [`LineWriter::write_response_until`].
    pub async fn write_response(&mut self, response: &Response) -> io::Result<()> {
        self.writer
            .write_response_until(response, &self.handle.cancellation)
            .await
    }

    /// Read lines from the client and answer them with `dispatcher` until the session is over.
    ///
    /// Failing to write a reply is logged, not fatal; the next read will notice a dead stream. A
    /// write still pending when [`ConnectionHandle::disconnect`] is called is abandoned. If
    /// the session ends in data mode, the data responder is told through
    /// [`crate::responder::DataResponder::data_aborted`].
    pub async fn run(&mut self, dispatcher: &Dispatcher) -> CloseReason {
        let cancellation = self.decoder.cancellation();
        let disconnected = self.handle.cancellation.clone();
        let mut close_reason = CloseReason::Disconnected;

        let events = self.decoder.run();
        pin_mut!(events);

        while let Some(event) = events.next().await {
            match event {
                DecoderEvent::ActivityDetected => self.session.touch(),
                DecoderEvent::LineReady(line) => {
                    let response = dispatcher.process_line(&mut self.session, &line);

                    let written = self
                        .writer
                        .write_response_until(&response, &disconnected)
                        .await;
                    if disconnected.is_cancelled() {
                        break;
                    }
                    if let Err(err) = written {
                        tracing::warn!("Failed to write response: {err}");
                    }

                    if response.is_disconnect() {
                        close_reason = CloseReason::Quit;
                        cancellation.cancel();
                    }
                }
                DecoderEvent::DisconnectRequested { expected: true } => {
                    close_reason = CloseReason::ClosedByClient;
                }
                DecoderEvent::DisconnectRequested { expected: false } => {
                    tracing::warn!("Connection lost unexpectedly");
                    close_reason = CloseReason::Lost;
                }
            }
        }

        if self.session.in_data_mode() {
            dispatcher.responders().data.data_aborted(&self.session);
        }

        close_reason
    }

    /// Close the stream. Safe to call more than once; failures to close are only logged.
    pub async fn disconnect(&mut self) {
        self.handle.disconnect();

        if let Err(err) = self.writer.shutdown().await {
            tracing::debug!("Failed to close connection: {err}");
        }
    }

    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        self.writer.is_shut_down()
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session", &self.session)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
