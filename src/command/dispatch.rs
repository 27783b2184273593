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

//! Applies commands to a [`Session`].

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{Command, Verb};
use crate::{
    error::panic_message,
    responder::Responders,
    response::responses,
    session::{Identification, IdentificationMode, MailAddress, Session},
    str::max_lengths,
    Response,
};

/// Return early with `$response` if `$condition` does not hold.
macro_rules! require {
    ( $condition:expr, $response:expr ) => {
        if !$condition {
            return $response;
        }
    };
}

/// Enforces the order of commands in a session and asks [`Responders`] about everything else.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    responders: Responders,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(responders: Responders) -> Self {
        Self { responders }
    }

    #[must_use]
    pub const fn responders(&self) -> &Responders {
        &self.responders
    }

    /// Reply to a line from the client, updating `session` if the line is accepted.
    ///
    /// Lines longer than [`max_lengths::LINE`] are always rejected. In data mode, every line is
    /// message content until a line consisting of only `.`. Outside of data mode, the raw line
    /// responder gets the first look at the line, then it is parsed as a [`Command`].
    ///
    /// Never fails: a panic while processing the line, including inside a responder, is logged and
    /// answered with [`responses::internal_error`].
    pub fn process_line(&self, session: &mut Session, line: &[u8]) -> Response {
        match catch_unwind(AssertUnwindSafe(|| self.dispatch(session, line))) {
            Ok(response) => response,
            Err(panic) => {
                tracing::error!("Failed to process line: {}", panic_message(&*panic));

                responses::internal_error()
            }
        }
    }

    fn dispatch(&self, session: &mut Session, line: &[u8]) -> Response {
        require!(line.len() <= max_lengths::LINE, responses::line_too_long());

        if session.in_data_mode() {
            return self.data_line(session, line);
        }

        let line = String::from_utf8_lossy(line);
        tracing::debug!("<<< {line}");

        let response = self.responders.raw_line.raw_line(session, &line);
        if !response.is_none() {
            return response;
        }

        let Some(Command { verb, argument }) = Command::parse(&line) else {
            return responses::not_implemented();
        };

        match verb {
            Verb::Helo => self.identify(session, IdentificationMode::Helo, argument),
            Verb::Ehlo => self.identify(session, IdentificationMode::Ehlo, argument),
            Verb::MailFrom => self.mail_from(session, argument),
            Verb::RcptTo => self.rcpt_to(session, argument),
            Verb::Data => self.data(session),
            Verb::Rset => self.rset(session),
            Verb::Vrfy => self.vrfy(session, argument),
            Verb::Noop => responses::ok(),
            Verb::Quit => responses::disconnect(),
        }
    }

    /// Reply to a line of message content, or to the `.` that ends it.
    ///
    /// [RFC 5321 section 4.1.1.4](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.4).
    fn data_line(&self, session: &mut Session, line: &[u8]) -> Response {
        if line != b"." {
            return self.responders.data.data_line(session, line);
        }

        tracing::debug!("End of data received");

        let data = &self.responders.data;
        let response = data.data_end(session);
        if response.is_success() || (response.is_failure() && data.rejection_ends_data()) {
            session.end_data();
        }

        response
    }

    /// Reply to the hello (`HELO`) or extended hello (`EHLO`) command.
    ///
    /// [RFC 5321 section 4.1.1.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.1).
    fn identify(
        &self,
        session: &mut Session,
        mode: IdentificationMode,
        argument: &str,
    ) -> Response {
        let argument = argument.trim();
        require!(!argument.is_empty(), responses::missing_domain(mode));

        let identification = Identification::new(mode, argument);
        let response = self
            .responders
            .identification
            .verify_identification(session, &identification);

        if response.is_success() {
            session.set_identification(identification);
        }

        response
    }

    /// Reply to the `MAIL FROM:` command.
    ///
    /// [RFC 5321 section 4.1.1.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.2).
    fn mail_from(&self, session: &mut Session, argument: &str) -> Response {
        require!(session.is_identified(), responses::not_identified());

        let Ok(address) = MailAddress::parse(argument) else {
            return responses::syntax_error();
        };

        let response = self.responders.mail_from.verify_mail_from(session, &address);
        if response.is_success() {
            session.set_mail_from(address);
        }

        response
    }

    /// Reply to the `RCPT TO:` command.
    ///
    /// [RFC 5321 section 4.1.1.3](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.3).
    fn rcpt_to(&self, session: &mut Session, argument: &str) -> Response {
        require!(session.is_identified(), responses::not_identified());
        require!(session.mail_from().is_some(), responses::mail_from_first());

        let Ok(address) = MailAddress::parse(argument) else {
            return responses::syntax_error();
        };

        let response = self
            .responders
            .recipient_to
            .verify_recipient_to(session, &address);
        if response.is_success() {
            session.add_recipient(address);
        }

        response
    }

    /// Reply to the `DATA` command.
    ///
    /// [RFC 5321 section 4.1.1.4](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.4).
    fn data(&self, session: &mut Session) -> Response {
        require!(session.is_identified(), responses::not_identified());
        require!(session.mail_from().is_some(), responses::mail_from_first());
        require!(!session.recipients().is_empty(), responses::recipient_first());

        let response = self.responders.data.data_start(session);
        if response.is_success() {
            session.start_data();
        }

        response
    }

    /// Reply to the reset (`RSET`) command.
    ///
    /// [RFC 5321 section 4.1.1.5](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.5).
    fn rset(&self, session: &mut Session) -> Response {
        let response = self.responders.reset.reset(session);
        if response.is_success() {
            session.reset();
        }

        response
    }

    /// Reply to the verify (`VRFY`) command.
    ///
    /// [RFC 5321 section 4.1.1.6](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.6).
    fn vrfy(&self, session: &Session, argument: &str) -> Response {
        require!(session.is_identified(), responses::not_identified());

        let argument = argument.trim();
        require!(!argument.is_empty(), responses::vrfy_missing_parameter());

        self.responders.verify.verify(session, argument)
    }
}
