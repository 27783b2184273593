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

//! Error types shared across the crate.
//!
//! Protocol-level failures are never errors here: a rejected command is a [`crate::Response`]
//! like any other. These types cover the things an embedder has to handle.

use std::any::Any;

use thiserror::Error;

/// A [`std::result::Result`] defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors from setting up or running the server.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line framer buffer size must be greater than zero")]
    ZeroBufferSize,

    #[error("server has already been shut down")]
    ShutDown,
}

/// Reasons that a `MAIL FROM:` or `RCPT TO:` argument could not be parsed as an address.
#[derive(Error, Debug, PartialEq, Eq, Copy, Clone)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address has no `@` separating the local part and the domain")]
    MissingAt,

    #[error("address has an empty local part")]
    EmptyUser,

    #[error("address has an empty domain")]
    EmptyHost,

    #[error("address has unbalanced angle brackets")]
    UnbalancedBrackets,

    #[error("address contains whitespace, control characters, or angle brackets")]
    InvalidCharacter,
}

/// Get a printable message out of a caught panic's payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
