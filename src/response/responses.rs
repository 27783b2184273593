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

//! The replies the server sends on its own, without asking a responder.
//!
//! Codes follow [RFC 5321 section 4.2.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2.2),
//! enhanced status codes follow [RFC 3463](https://www.rfc-editor.org/rfc/rfc3463.html).

use super::Response;
use crate::session::IdentificationMode;

/// Generate functions returning fixed [`Response`]s, optionally including documentation comments.
macro_rules! responses {
    [$(
        $( #[$attr:meta] )*
        $name:ident = $code:literal $text:literal
    ),+ ,] => {
        $(
            $( #[$attr] )*
            #[must_use]
            pub fn $name() -> Response {
                Response::new($code, $text)
            }
        )+
    };
}

responses![
    /// `250 OK`, the generic success reply.
    ok = 250 "OK",
    /// The reply to a successful `DATA`.
    data_start = 354 "OK",
    /// The reply to `QUIT`. Sending it ends the session.
    disconnect = 221 "Bye",
    /// Something went wrong inside of the server while processing a command.
    internal_error = 500 "Internal Server Error",
    line_too_long = 500 "Line Too Long",
    not_implemented = 502 "5.5.2 Command not implemented",
    not_identified = 502 "5.5.1 Use HELO/EHLO first.",
    syntax_error = 501 "Syntax error in parameters or arguments",
    vrfy_missing_parameter = 501 "VRFY Missing parameter.",
    mail_from_first = 502 "5.5.1 Use MAIL FROM first.",
    recipient_first = 503 "5.5.1 Must have recipient first",
    /// `VRFY` is answered without verifying anything, per [RFC 5321 section
    /// 3.5.3](https://www.rfc-editor.org/rfc/rfc5321.html#section-3.5.3).
    cannot_verify = 252 "2.5.2 Send some mail, I'll try my best",
    too_many_recipients = 452 "4.5.3 Too many recipients",
    message_too_big = 552 "5.3.4 Message size exceeds fixed maximum message size",
    /// The server accepted the command, but could not do anything with it.
    local_error = 451 "4.3.0 Requested action aborted: local error in processing",
];

/// The reply to a `HELO` or `EHLO` without a domain.
#[must_use]
pub fn missing_domain(mode: IdentificationMode) -> Response {
    Response::new(501, format!("{mode} Missing domain address."))
}

/// The reply to an identification that is neither `HELO` nor `EHLO`.
#[must_use]
pub fn invalid_identification(mode: IdentificationMode) -> Response {
    Response::new(500, format!("Invalid Identification ({mode})"))
}
