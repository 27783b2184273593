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

//! Collects whole messages and hands them to the embedding application.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::mpsc;

use super::DataResponder;
use crate::{
    config::Configuration,
    response::responses,
    session::{MailAddress, Session},
    str::CRLF,
    Response,
};

/// A message that was accepted by [`MessageCollector`].
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ReceivedMessage {
    /// See [`Session::id`].
    pub session_id: u64,
    pub remote: SocketAddr,
    pub mail_from: Option<MailAddress>,
    /// Every recipient of the session's current transaction.
    ///
    /// A transaction is only cleared by `RSET`, so a second message sent on the same connection
    /// without one also lists the recipients of the first.
    pub recipients: Vec<MailAddress>,
    /// The content with dot-stuffing removed and every line ending in `CRLF`.
    pub body: Vec<u8>,
}

/// The content received so far in one session.
#[derive(Default)]
pub(super) struct Body {
    data: Vec<u8>,
    /// The content went past [`crate::config::Settings::max_message_size`], so the rest is
    /// dropped and the message will be rejected.
    oversized: bool,
}

/// A [`DataResponder`] that sends every complete message into a channel.
///
/// Removes dot-stuffing ([RFC 5321 section
/// 4.5.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.2)), and rejects messages larger
/// than [`crate::config::Settings::max_message_size`] with `552` once the client finishes
/// sending. Either rejection (`552`, or `451` when nothing receives messages anymore) ends data
/// mode, so the client can go on with `RSET` or `QUIT`.
#[derive(Debug)]
pub struct MessageCollector {
    config: Arc<Configuration>,
    bodies: Mutex<HashMap<u64, Body>>,
    sender: mpsc::UnboundedSender<ReceivedMessage>,
}

impl MessageCollector {
    /// Create a [`Self`], along with the receiving end of its messages.
    #[must_use]
    pub fn new(config: Arc<Configuration>) -> (Self, mpsc::UnboundedReceiver<ReceivedMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let collector = Self {
            config,
            bodies: Mutex::default(),
            sender,
        };

        (collector, receiver)
    }

    pub(super) fn bodies(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Body>> {
        self.bodies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataResponder for MessageCollector {
    fn data_start(&self, session: &Session) -> Response {
        self.bodies().insert(session.id(), Body::default());

        responses::data_start()
    }

    fn data_line(&self, session: &Session, line: &[u8]) -> Response {
        let max_size = self.config.max_message_size();
        let line = line.strip_prefix(b".").unwrap_or(line);

        let mut bodies = self.bodies();
        let body = bodies.entry(session.id()).or_default();

        if body.oversized {
            return Response::NONE;
        }

        if body.data.len() + line.len() + CRLF.len() > max_size {
            body.oversized = true;
            body.data = Vec::new();
        } else {
            body.data.extend_from_slice(line);
            body.data.extend_from_slice(CRLF.as_bytes());
        }

        Response::NONE
    }

    fn data_end(&self, session: &Session) -> Response {
        let body = self.bodies().remove(&session.id()).unwrap_or_default();

        if body.oversized {
            return responses::message_too_big();
        }

        let message = ReceivedMessage {
            session_id: session.id(),
            remote: session.remote(),
            mail_from: session.mail_from().cloned(),
            recipients: session.recipients().to_vec(),
            body: body.data,
        };

        if self.sender.send(message).is_err() {
            tracing::warn!(
                "Dropped a message from {}: nothing is receiving messages",
                session.remote()
            );

            return responses::local_error();
        }

        responses::ok()
    }

    fn rejection_ends_data(&self) -> bool {
        true
    }

    fn data_aborted(&self, session: &Session) {
        self.bodies().remove(&session.id());
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body")
            .field("len", &self.data.len())
            .field("oversized", &self.oversized)
            .finish()
    }
}
