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

//! The maximum sizes of a variety of items.
//!
//! [RFC 5321 section 4.5.3.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.3.1) only
//! defines *minimum* values that servers must be able to handle. The values here are generous
//! versions of those.

/// The longest line, in bytes and without its line ending, that the server will process.
///
/// Anything longer is answered with `500 Line Too Long`. RFC 5321 only requires 512 bytes for a
/// command line and 1,000 bytes for a text line (sections 4.5.3.1.4 and 4.5.3.1.6).
pub const LINE: usize = 2_040;

/// The default maximum size of a message in bytes, 20 MiB.
///
/// [RFC 5321 § 4.5.3.1.7](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.3.1.7) only
/// requires 64,000 bytes, and strongly recommends raising that.
pub const MESSAGE: usize = 20 * 1024 * 1024;

/// The default maximum number of recipients of a single message.
///
/// [RFC 5321 § 4.5.3.1.8](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.3.1.8).
pub const RECIPIENTS: usize = 100;

/// The default size, in bytes, of the buffer that [`crate::line::LineFramer`] reads into.
pub const READ_BUFFER: usize = 4_096;
