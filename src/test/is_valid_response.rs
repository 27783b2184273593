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

/// Checks whether a string is ASCII and ends with `CRLF`.
///
/// [RFC 5321](https://www.rfc-editor.org/rfc/rfc5321.html) requires that only US-ASCII character
/// encoding (sections 2.3.1 and 2.4) and `CRLF` line endings (section 2.3.8) are used.
#[inline]
pub fn smtp_line(str: &str) -> bool {
    str.ends_with("\r\n") && str.is_ascii()
}

/// Checks whether a string is the last line of a reply with `code`, as opposed to a continuation
/// line ([RFC 5321 section 4.2.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2.1)).
pub fn final_line(str: &str, code: u16) -> bool {
    smtp_line(str) && str.starts_with(&format!("{code} "))
}

/// Checks if the server's opening message roughly matches [RFC 5321,
/// section 4.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2).
///
/// Considers a 554 response to be an error.
pub fn server_greeting(str: &str) -> bool {
    final_line(str, 220)
}

/// Checks for a plain `250`, the reply to most accepted commands.
pub fn ok(str: &str) -> bool {
    final_line(str, 250)
}

/// Checks if the server's reply to `EHLO` matches [RFC 5321, section
/// 4.1.1.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.1): every line but the last
/// is a `250-` continuation, and the last is a `250 ` line.
pub fn ehlo(lines: &[String]) -> bool {
    let Some((last, rest)) = lines.split_last() else {
        return false;
    };

    ok(last)
        && rest
            .iter()
            .all(|line| smtp_line(line) && line.starts_with("250-"))
}

/// Checks for the intermediate reply to `DATA` ([RFC 5321, section
/// 4.1.1.4](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.4)).
pub fn data(str: &str) -> bool {
    final_line(str, 354)
}

/// Checks if the server's response to the `QUIT` command matches [RFC 5321, section
/// 4.1.1.10](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.10).
pub fn quit(str: &str) -> bool {
    final_line(str, 221)
}
