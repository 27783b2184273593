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

//! Building the lines the server sends back to clients.

use std::borrow::Cow;

use ascii::{AsAsciiStr, AsciiChar, AsciiStr, AsciiString};

pub mod max_lengths;

pub const CRLF: &str = "\r\n";

/// Indicates if a reply line is the last line of its reply.
///
/// See [RFC 5321 section 4.2.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2.1).
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum MultiLine {
    /// This is the last line of the reply.
    LastLine,
    /// This is not the last line of the reply, there will be more following it.
    HasNext,
}

impl MultiLine {
    /// Get the character used to split the code and text of an SMTP reply line.
    #[must_use]
    pub const fn split(self) -> char {
        match self {
            Self::LastLine => ' ',
            Self::HasNext => '-',
        }
    }
}

/// Make reply text safe to send to a client.
///
/// [RFC 5321](https://www.rfc-editor.org/rfc/rfc5321.html) requires that only US-ASCII character
/// encoding (sections 2.3.1 and 2.4) is used. A reply line also must not contain a line break of
/// its own, or the client would read the rest of it as a separate reply.
///
/// Replaces:
/// - Any [`AsciiChar::CarriageReturn`] or [`AsciiChar::LineFeed`] with [`AsciiChar::Space`].
/// - Any non-ASCII character with [`AsciiChar::Question`].
///
/// If the text does not need to be modified, this function will not allocate.
///
/// # Examples
///
/// ```rust
/// # use smtp_embed::str::sanitize;
/// assert_eq!(sanitize("OK").as_str(), "OK");
/// assert_eq!(sanitize("two\r\nlines").as_str(), "two  lines");
/// assert_eq!(sanitize("café").as_str(), "caf?");
/// ```
#[must_use]
pub fn sanitize(text: &str) -> Cow<'_, AsciiStr> {
    if let Ok(ascii) = text.as_ascii_str() {
        let has_break = ascii
            .chars()
            .any(|ch| matches!(ch, AsciiChar::CarriageReturn | AsciiChar::LineFeed));

        if !has_break {
            return Cow::Borrowed(ascii);
        }
    }

    let sanitized: AsciiString = text
        .chars()
        .map(|c| match c {
            '\r' | '\n' => AsciiChar::Space,
            c => AsciiChar::from_ascii(c).unwrap_or(AsciiChar::Question),
        })
        .collect();

    Cow::Owned(sanitized)
}

/// Format one line of a reply, including the trailing [`CRLF`].
///
/// The output is always ASCII, see [`sanitize`].
///
/// ```rust
/// # use smtp_embed::str::{reply_line, MultiLine};
/// assert_eq!(reply_line(250, MultiLine::HasNext, "PIPELINING"), "250-PIPELINING\r\n");
/// assert_eq!(reply_line(250, MultiLine::LastLine, "OK"), "250 OK\r\n");
/// ```
#[must_use]
pub fn reply_line(code: u16, multiline: MultiLine, text: &str) -> String {
    format!(
        "{code:03}{}{}{CRLF}",
        multiline.split(),
        sanitize(text).as_str()
    )
}
