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

//! Turns a source of lines into a stream of [`DecoderEvent`]s.
//!
//! See [`RawLineDecoder::run`].

use std::{future::Future, io, panic::AssertUnwindSafe};

use async_stream::stream;
use futures_core::Stream;
use futures_util::FutureExt;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::{
    error::panic_message,
    line::{strip_escapes, LineFramer},
};


/// Something that lines can be pulled out of, one at a time.
pub trait LineSource {
    /// Get the next line, or `Ok(None)` at the end of the stream.
    ///
    /// The returned future must be cancel safe.
    fn next_line(&mut self) -> impl Future<Output = io::Result<Option<Vec<u8>>>> + Send;
}

impl<R: AsyncRead + Unpin + Send> LineSource for LineFramer<R> {
    fn next_line(&mut self) -> impl Future<Output = io::Result<Option<Vec<u8>>>> + Send {
        self.read_line_async()
    }
}

/// Something that happened while reading lines.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum DecoderEvent {
    /// A line was read, and will be delivered next as [`Self::LineReady`].
    ActivityDetected,
    /// A line was read, with all of its escapes applied (see [`strip_escapes`]).
    LineReady(Vec<u8>),
    /// The line source cannot produce any more lines, so the connection should be closed.
    DisconnectRequested {
        /// `true` if the source ended normally, `false` if it failed.
        expected: bool,
    },
}

/// Pulls lines out of a [`LineSource`] until it ends, fails, or is cancelled.
///
/// Every call to [`Self::run`] is its own cancellation scope: cancelling one run does not affect
/// the next.
#[derive(Debug)]
pub struct RawLineDecoder<S> {
    source: S,
    parent: CancellationToken,
    current: CancellationToken,
}

impl<S: LineSource + Send> RawLineDecoder<S> {
    /// Create a [`Self`] that can only be cancelled through [`Self::cancel`].
    pub fn new(source: S) -> Self {
        Self::with_parent(source, CancellationToken::new())
    }

    /// Create a [`Self`] whose runs are also cancelled when `parent` is cancelled.
    pub fn with_parent(source: S, parent: CancellationToken) -> Self {
        let current = parent.child_token();

        Self {
            source,
            parent,
            current,
        }
    }

    /// Stop the current run, or the next run if none is in progress.
    ///
    /// A stopped run ends its stream without emitting anything else.
    pub fn cancel(&self) {
        self.current.cancel();
    }

    /// Get the token that cancels the current run, for cancelling from somewhere else.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.current.clone()
    }

    /// Read lines until the source ends, fails, or the run is cancelled.
    ///
    /// For every line read, emits [`DecoderEvent::ActivityDetected`] and then
    /// [`DecoderEvent::LineReady`]. The stream ends after a [`DecoderEvent::DisconnectRequested`],
    /// or silently if the run is cancelled. A panic inside the source is logged and treated like
    /// an I/O failure.
    ///
    /// Once the returned stream is dropped, the next call gets a fresh cancellation scope.
    pub fn run(&mut self) -> impl Stream<Item = DecoderEvent> + Send + '_ {
        let Self {
            source,
            parent,
            current,
        } = self;

        let token = current.clone();
        let renew = RenewOnDrop { parent, current };

        stream! {
            let _renew = renew;

            loop {
                if token.is_cancelled() {
                    break;
                }

                let read = AssertUnwindSafe(source.next_line()).catch_unwind();
                let result = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    result = read => result,
                };

                match result {
                    Ok(Ok(Some(line))) => {
                        yield DecoderEvent::ActivityDetected;
                        yield DecoderEvent::LineReady(strip_escapes(line));
                    }
                    Ok(Ok(None)) => {
                        yield DecoderEvent::DisconnectRequested { expected: true };
                        break;
                    }
                    Ok(Err(err)) => {
                        tracing::debug!("Failed to read line: {err}");
                        yield DecoderEvent::DisconnectRequested { expected: false };
                        break;
                    }
                    Err(panic) => {
                        tracing::error!("Line source panicked: {}", panic_message(&*panic));
                        yield DecoderEvent::DisconnectRequested { expected: false };
                        break;
                    }
                }
            }
        }
    }
}

/// Replaces the current cancellation scope with a fresh one when a run ends.
struct RenewOnDrop<'a> {
    parent: &'a CancellationToken,
    current: &'a mut CancellationToken,
}

impl Drop for RenewOnDrop<'_> {
    fn drop(&mut self) {
        *self.current = self.parent.child_token();
    }
}
