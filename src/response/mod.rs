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

//! Replies from the server to the client.
//!
//! See [`Response`], and [`responses`] for the replies the server itself uses.

use std::fmt::Display;

use crate::str::{reply_line, MultiLine};

pub mod responses;

/// A reply to a line from the client.
///
/// [RFC 5321 section 4.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2). A reply may
/// span multiple lines: every line in [`Self::continuation`] is sent first as `<code>-<line>`,
/// then [`Self::text`] as `<code> <text>`.
#[derive(PartialEq, Eq, Debug, Clone, Default, Hash)]
pub struct Response {
    pub code: u16,
    pub text: String,
    pub continuation: Vec<String>,
}

impl Response {
    /// Do not reply at all.
    ///
    /// Compared by value, so any [`Self`] equal to this is treated the same way.
    pub const NONE: Self = Self {
        code: 0,
        text: String::new(),
        continuation: Vec::new(),
    };

    /// The code that ends the session once it has been sent.
    ///
    /// [RFC 5321 section 4.1.1.10](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.10).
    pub const DISCONNECT_CODE: u16 = 221;

    #[must_use]
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            continuation: Vec::new(),
        }
    }

    /// Add lines to be sent before [`Self::text`].
    #[must_use]
    pub fn with_continuation<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.continuation.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Clone this response with different [`Self::text`].
    #[must_use]
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            code: self.code,
            text: text.into(),
            continuation: self.continuation.clone(),
        }
    }

    /// Whether this is [`Self::NONE`].
    #[must_use]
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Whether this is a positive completion or intermediate reply (`2xx` or `3xx`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, 200..=399)
    }

    /// Whether this is a transient or permanent negative completion reply (`4xx` or `5xx`).
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.code, 400..=599)
    }

    /// Whether sending this should end the session.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        self.code == Self::DISCONNECT_CODE
    }

    /// Format every line of this response as it is sent to the client.
    ///
    /// Empty for [`Self::NONE`].
    ///
    /// ```rust
    /// # use smtp_embed::Response;
    /// let response = Response::new(250, "SIZE 1000").with_continuation(["localhost", "PIPELINING"]);
    ///
    /// assert_eq!(
    ///     response.to_wire(),
    ///     ["250-localhost\r\n", "250-PIPELINING\r\n", "250 SIZE 1000\r\n"]
    /// );
    /// assert!(Response::NONE.to_wire().is_empty());
    /// ```
    #[must_use]
    pub fn to_wire(&self) -> Vec<String> {
        if self.is_none() {
            return Vec::new();
        }

        self.continuation
            .iter()
            .map(|line| reply_line(self.code, MultiLine::HasNext, line))
            .chain(std::iter::once(reply_line(
                self.code,
                MultiLine::LastLine,
                &self.text,
            )))
            .collect()
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.continuation {
            writeln!(f, "{}{}{line}", self.code, MultiLine::HasNext.split())?;
        }

        write!(f, "{} {}", self.code, self.text)
    }
}
