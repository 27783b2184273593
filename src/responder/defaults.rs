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

//! Responders that need no input from the embedding application.

use std::sync::Arc;

use super::{
    DataResponder, IdentificationResponder, MailFromResponder, RawLineResponder,
    RecipientToResponder, ResetResponder, VerifyResponder,
};
use crate::{
    config::Configuration,
    response::responses,
    session::{Identification, IdentificationMode, MailAddress, Session},
    Response,
};

/// Accepts everything, and does nothing with it.
///
/// - `DATA` is answered with `354`, content lines are not answered, and the end of the content is
///   answered with `250 OK`.
/// - `VRFY` is answered with `252`, see [`responses::cannot_verify`].
/// - The raw line hook never replies.
/// - Everything else is answered with `250 OK`.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
pub struct DefaultResponder;

impl MailFromResponder for DefaultResponder {
    fn verify_mail_from(&self, _: &Session, _: &MailAddress) -> Response {
        responses::ok()
    }
}

impl RecipientToResponder for DefaultResponder {
    fn verify_recipient_to(&self, _: &Session, _: &MailAddress) -> Response {
        responses::ok()
    }
}

impl DataResponder for DefaultResponder {
    fn data_start(&self, _: &Session) -> Response {
        responses::data_start()
    }

    fn data_line(&self, _: &Session, _: &[u8]) -> Response {
        Response::NONE
    }

    fn data_end(&self, _: &Session) -> Response {
        responses::ok()
    }
}

impl ResetResponder for DefaultResponder {
    fn reset(&self, _: &Session) -> Response {
        responses::ok()
    }
}

impl VerifyResponder for DefaultResponder {
    fn verify(&self, _: &Session, _: &str) -> Response {
        responses::cannot_verify()
    }
}

impl RawLineResponder for DefaultResponder {
    fn raw_line(&self, _: &Session, _: &str) -> Response {
        Response::NONE
    }
}

/// Accepts every `HELO` and `EHLO`.
///
/// `EHLO` is answered with the server's extensions ([RFC 5321 section
/// 4.1.1.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.1)):
///
/// ```text
/// 250-<greeting>
/// 250-PIPELINING
/// 250 SIZE <max message size>
/// ```
#[derive(Debug, Clone)]
pub struct DefaultIdentificationResponder {
    config: Arc<Configuration>,
}

impl DefaultIdentificationResponder {
    #[must_use]
    pub const fn new(config: Arc<Configuration>) -> Self {
        Self { config }
    }
}

impl IdentificationResponder for DefaultIdentificationResponder {
    fn verify_identification(&self, _: &Session, identification: &Identification) -> Response {
        match identification.mode {
            IdentificationMode::Helo => responses::ok(),
            IdentificationMode::Ehlo => {
                let settings = self.config.settings();

                Response::new(250, format!("SIZE {}", settings.max_message_size))
                    .with_continuation([settings.default_greeting, "PIPELINING".to_string()])
            }
            mode @ IdentificationMode::NotIdentified => responses::invalid_identification(mode),
        }
    }
}

/// Rejects recipients past [`crate::config::Settings::max_recipients`], and asks another
/// responder about the rest.
#[derive(Debug, Clone)]
pub struct RecipientLimit<R> {
    config: Arc<Configuration>,
    inner: R,
}

impl<R: RecipientToResponder> RecipientLimit<R> {
    #[must_use]
    pub const fn new(config: Arc<Configuration>, inner: R) -> Self {
        Self { config, inner }
    }
}

impl<R: RecipientToResponder> RecipientToResponder for RecipientLimit<R> {
    fn verify_recipient_to(&self, session: &Session, address: &MailAddress) -> Response {
        if session.recipients().len() >= self.config.max_recipients() {
            return responses::too_many_recipients();
        }

        self.inner.verify_recipient_to(session, address)
    }
}
