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

//! The decisions an embedding application makes about a session.
//!
//! The server enforces the order of commands itself, then asks a responder whether to accept each
//! one. A responder accepts by returning a successful [`Response`] (see
//! [`Response::is_success`]), and anything else is sent to the client as a rejection. The session
//! only changes when a command is accepted.
//!
//! Every single-method responder trait is implemented for matching closures:
//!
//! ```rust
//! # use std::sync::Arc;
//! # use smtp_embed::{config::Configuration, responder::Responders, response::responses};
//! # use smtp_embed::{session::MailAddress, Response, Session};
//! let responders = Responders::new(Arc::new(Configuration::default()))
//!     .with_recipient_to(|_: &Session, address: &MailAddress| {
//!         if address.host() == "example.com" {
//!             responses::ok()
//!         } else {
//!             Response::new(550, "5.1.1 Mailbox unavailable")
//!         }
//!     });
//! ```

use std::{fmt::Debug, sync::Arc};

use crate::{
    config::Configuration,
    session::{Identification, MailAddress, Session},
    Response,
};

mod collector;
mod defaults;

pub use collector::{MessageCollector, ReceivedMessage};
pub use defaults::{DefaultIdentificationResponder, DefaultResponder, RecipientLimit};

/// Decides whether to accept a `HELO` or `EHLO`.
pub trait IdentificationResponder: Send + Sync {
    fn verify_identification(
        &self,
        session: &Session,
        identification: &Identification,
    ) -> Response;
}

/// Decides whether to accept the sender of a `MAIL FROM:`.
pub trait MailFromResponder: Send + Sync {
    fn verify_mail_from(&self, session: &Session, address: &MailAddress) -> Response;
}

/// Decides whether to accept the recipient of a `RCPT TO:`.
pub trait RecipientToResponder: Send + Sync {
    fn verify_recipient_to(&self, session: &Session, address: &MailAddress) -> Response;
}

/// Receives the content of a message.
pub trait DataResponder: Send + Sync {
    /// Decide whether to accept a `DATA` command.
    fn data_start(&self, session: &Session) -> Response;

    /// Receive one line of content, without its line ending.
    ///
    /// Lines are passed on exactly as received, so lines starting with `.` are still
    /// dot-stuffed ([RFC 5321 section 4.5.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.2)).
    /// Usually returns [`Response::NONE`], since clients do not expect replies to content.
    fn data_line(&self, session: &Session, line: &[u8]) -> Response;

    /// Decide whether to accept the message, after the client sends the final `.`.
    ///
    /// A success (`2xx` or `3xx`) always leaves data mode. A failure only does when
    /// [`Self::rejection_ends_data`] says so; otherwise the session stays in data mode and every
    /// following line, including `QUIT`, is passed to [`Self::data_line`].
    fn data_end(&self, session: &Session) -> Response;

    /// Whether a failing reply (`4xx` or `5xx`) from [`Self::data_end`] is final, ending data mode
    /// like a success does.
    ///
    /// Responders that reject whole messages, as opposed to asking for more content, should return
    /// `true`; [RFC 5321 section 4.1.1.4](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.4)
    /// treats any reply to the final `.` as the end of the transaction.
    fn rejection_ends_data(&self) -> bool {
        false
    }

    /// The session ended while in data mode, so [`Self::data_end`] will never be called.
    fn data_aborted(&self, _session: &Session) {}
}

/// Decides whether to accept a `RSET`.
pub trait ResetResponder: Send + Sync {
    fn reset(&self, session: &Session) -> Response;
}

/// Answers a `VRFY`.
pub trait VerifyResponder: Send + Sync {
    fn verify(&self, session: &Session, argument: &str) -> Response;
}

/// Gets the first look at every command line, before it is parsed.
///
/// Returning anything other than [`Response::NONE`] replies with that and skips all other
/// processing of the line. Lines received in data mode are never passed here.
pub trait RawLineResponder: Send + Sync {
    fn raw_line(&self, session: &Session, line: &str) -> Response;
}

impl<F> IdentificationResponder for F
where
    F: Fn(&Session, &Identification) -> Response + Send + Sync,
{
    fn verify_identification(
        &self,
        session: &Session,
        identification: &Identification,
    ) -> Response {
        self(session, identification)
    }
}

impl<F> MailFromResponder for F
where
    F: Fn(&Session, &MailAddress) -> Response + Send + Sync,
{
    fn verify_mail_from(&self, session: &Session, address: &MailAddress) -> Response {
        self(session, address)
    }
}

impl<F> RecipientToResponder for F
where
    F: Fn(&Session, &MailAddress) -> Response + Send + Sync,
{
    fn verify_recipient_to(&self, session: &Session, address: &MailAddress) -> Response {
        self(session, address)
    }
}

impl<F> ResetResponder for F
where
    F: Fn(&Session) -> Response + Send + Sync,
{
    fn reset(&self, session: &Session) -> Response {
        self(session)
    }
}

impl<F> VerifyResponder for F
where
    F: Fn(&Session, &str) -> Response + Send + Sync,
{
    fn verify(&self, session: &Session, argument: &str) -> Response {
        self(session, argument)
    }
}

impl<F> RawLineResponder for F
where
    F: Fn(&Session, &str) -> Response + Send + Sync,
{
    fn raw_line(&self, session: &Session, line: &str) -> Response {
        self(session, line)
    }
}

/// One of each responder, shared by every session of a server.
#[derive(Clone)]
pub struct Responders {
    pub identification: Arc<dyn IdentificationResponder>,
    pub mail_from: Arc<dyn MailFromResponder>,
    pub recipient_to: Arc<dyn RecipientToResponder>,
    pub data: Arc<dyn DataResponder>,
    pub reset: Arc<dyn ResetResponder>,
    pub verify: Arc<dyn VerifyResponder>,
    pub raw_line: Arc<dyn RawLineResponder>,
}

impl Responders {
    /// Create a [`Self`] that accepts everything.
    ///
    /// See [`DefaultIdentificationResponder`] and [`DefaultResponder`].
    #[must_use]
    pub fn new(config: Arc<Configuration>) -> Self {
        let permissive = Arc::new(DefaultResponder);

        Self {
            identification: Arc::new(DefaultIdentificationResponder::new(config)),
            mail_from: permissive.clone(),
            recipient_to: permissive.clone(),
            data: permissive.clone(),
            reset: permissive.clone(),
            verify: permissive.clone(),
            raw_line: permissive,
        }
    }

    #[must_use]
    pub fn with_identification(
        mut self,
        responder: impl IdentificationResponder + 'static,
    ) -> Self {
        self.identification = Arc::new(responder);
        self
    }

    #[must_use]
    pub fn with_mail_from(mut self, responder: impl MailFromResponder + 'static) -> Self {
        self.mail_from = Arc::new(responder);
        self
    }

    #[must_use]
    pub fn with_recipient_to(mut self, responder: impl RecipientToResponder + 'static) -> Self {
        self.recipient_to = Arc::new(responder);
        self
    }

    #[must_use]
    pub fn with_data(mut self, responder: impl DataResponder + 'static) -> Self {
        self.data = Arc::new(responder);
        self
    }

    #[must_use]
    pub fn with_reset(mut self, responder: impl ResetResponder + 'static) -> Self {
        self.reset = Arc::new(responder);
        self
    }

    #[must_use]
    pub fn with_verify(mut self, responder: impl VerifyResponder + 'static) -> Self {
        self.verify = Arc::new(responder);
        self
    }

    #[must_use]
    pub fn with_raw_line(mut self, responder: impl RawLineResponder + 'static) -> Self {
        self.raw_line = Arc::new(responder);
        self
    }
}

impl Debug for Responders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responders").finish_non_exhaustive()
    }
}
