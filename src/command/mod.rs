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

//! Handles responding to a line from an SMTP client.
//!
//! See [`Dispatcher::process_line`].

use std::fmt::Display;

mod dispatch;

pub use dispatch::Dispatcher;

/// The commands the server understands.
///
/// [RFC 5321 section 4.5.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.1) lists these
/// as the minimum implementation.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum Verb {
    Helo,
    Ehlo,
    MailFrom,
    RcptTo,
    Data,
    Rset,
    Vrfy,
    Noop,
    Quit,
}

impl Verb {
    const ALL: [Self; 9] = [
        Self::Helo,
        Self::Ehlo,
        Self::MailFrom,
        Self::RcptTo,
        Self::Data,
        Self::Rset,
        Self::Vrfy,
        Self::Noop,
        Self::Quit,
    ];

    /// Get the verb as it is matched against a line, in uppercase.
    ///
    /// `MAIL FROM:` and `RCPT TO:` include their colon, everything else is a single word.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Helo => "HELO",
            Self::Ehlo => "EHLO",
            Self::MailFrom => "MAIL FROM:",
            Self::RcptTo => "RCPT TO:",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Vrfy => "VRFY",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }

    /// Find the verb spelled exactly as `name`, which should already be uppercase.
    fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.as_str() == name)
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an SMTP command, split into its verb and argument.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Command<'a> {
    pub verb: Verb,
    /// Everything after the verb, unmodified. Empty for a line that is only a verb.
    ///
    /// Note that the mailbox-local part of an email address (ex. `smith` in `smith@example.com`)
    /// is case-sensitive, so the argument keeps its case.
    pub argument: &'a str,
}

impl<'a> Command<'a> {
    /// Parse a line as a command, or `None` if it does not start with a known verb.
    ///
    /// The verb is found by trying, in order:
    ///
    /// 1. Everything up to and including the first `':'`, for `MAIL FROM:` and `RCPT TO:`.
    /// 2. Everything up to the first `' '`.
    /// 3. The entire line.
    ///
    /// Each candidate is trimmed of whitespace and compared ignoring ASCII case.
    ///
    /// ```rust
    /// # use smtp_embed::command::{Command, Verb};
    /// let command = Command::parse("rcpt to:<Smith@example.com>").unwrap();
    ///
    /// assert_eq!(command.verb, Verb::RcptTo);
    /// assert_eq!(command.argument, "<Smith@example.com>");
    /// assert_eq!(Command::parse("  quit  ").unwrap().verb, Verb::Quit);
    /// assert_eq!(Command::parse("TURN"), None);
    /// ```
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Self> {
        /// Split `line` after the first `separator`, uppercasing and trimming the part before.
        fn split_after(line: &str, separator: char) -> Option<(String, &str)> {
            let end = line.find(separator)? + separator.len_utf8();

            Some((line[..end].trim().to_ascii_uppercase(), &line[end..]))
        }

        for separator in [':', ' '] {
            if let Some((name, argument)) = split_after(line, separator) {
                if let Some(verb) = Verb::lookup(&name) {
                    return Some(Self { verb, argument });
                }
            }
        }

        Verb::lookup(&line.trim().to_ascii_uppercase()).map(|verb| Self { verb, argument: "" })
    }
}
