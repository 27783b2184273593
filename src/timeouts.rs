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

//! The default amounts of time the server waits on clients and on itself.
//!
//! [RFC 5321 section 4.5.3.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.3.2) only
//! defines a minimum of five minutes that a server should wait for the next command. Embedded
//! servers are usually talking to well-behaved local clients, so [`CONNECTION_IDLE`] is much
//! stricter than that. Both [`GLOBAL_CONNECTION`] and [`CONNECTION_IDLE`] are only defaults, see
//! [`crate::config::Settings`].

/// Generate `const` items with [`std::time::Duration`] values in the given unit, optionally
/// including documentation comments.
///
/// Does not account for leap seconds or similar shenanigans. A "minute" is 60 of whatever
/// [`std::time::Duration`] considers to be a "second."
macro_rules! durations {
    (@unit $amount:literal minutes) => {
        ::std::time::Duration::from_secs($amount * 60)
    };
    (@unit $amount:literal seconds) => {
        ::std::time::Duration::from_secs($amount)
    };
    (@unit $amount:literal milliseconds) => {
        ::std::time::Duration::from_millis($amount)
    };
    [$(
        $( #[$attr:meta] )*
        $label:ident = $amount:literal $unit:ident
    ),+ ,] => {
        $(
            $( #[$attr] )*
            pub const $label: ::std::time::Duration = durations!(@unit $amount $unit);
        )+
    };
}

durations![
    /// How long a connection may stay open in total, regardless of activity.
    GLOBAL_CONNECTION = 10 minutes,
    /// How long a connection may go without sending a single line.
    CONNECTION_IDLE = 60 seconds,
    /// How often the [`crate::watchdog::Watchdog`] sweeps the live connections.
    WATCHDOG_INTERVAL = 1 seconds,
    /// How long the server waits after writing `221` before closing the connection, so that the
    /// client gets a chance to read the reply.
    DISCONNECT_GRACE = 100 milliseconds,
];
