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

//! The protocol state of one SMTP session.

use std::{
    fmt::Display,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::Instant;

mod address;

pub use address::{MailAddress, Parameters};

/// Source of [`Session::id`].
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// How the client introduced itself.
///
/// [RFC 5321 section 4.1.1.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.1).
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default, Hash)]
pub enum IdentificationMode {
    /// The client has not sent a successful `HELO` or `EHLO` yet.
    #[default]
    NotIdentified,
    Helo,
    Ehlo,
}

impl IdentificationMode {
    /// Get the command verb that produces this mode, if any.
    #[must_use]
    pub const fn verb(self) -> Option<&'static str> {
        match self {
            Self::NotIdentified => None,
            Self::Helo => Some("HELO"),
            Self::Ehlo => Some("EHLO"),
        }
    }
}

impl Display for IdentificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb().unwrap_or("NONE"))
    }
}

/// A `HELO` or `EHLO` command and its argument, usually the client's domain.
#[derive(PartialEq, Eq, Debug, Clone, Default, Hash)]
pub struct Identification {
    pub mode: IdentificationMode,
    pub argument: String,
}

impl Identification {
    #[must_use]
    pub fn new(mode: IdentificationMode, argument: impl Into<String>) -> Self {
        Self {
            mode,
            argument: argument.into(),
        }
    }
}

/// Tracks the last time that a client did anything.
///
/// Shared between the task that reads from the connection and the
/// [`crate::watchdog::Watchdog`], so it only uses atomics.
#[derive(Debug)]
pub struct ActivityClock {
    origin: Instant,
    /// Milliseconds after [`Self::origin`].
    last_activity: AtomicU64,
}

impl ActivityClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_activity: AtomicU64::new(0),
        }
    }

    /// Record activity at the current time.
    pub fn touch(&self) {
        self.last_activity
            .store(as_millis(self.origin.elapsed()), Ordering::Relaxed);
    }

    /// Get how long it has been since the last activity.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        let now = as_millis(self.origin.elapsed());
        let last = self.last_activity.load(Ordering::Relaxed);

        Duration::from_millis(now.saturating_sub(last))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The state of one SMTP session.
///
/// A session starts [`IdentificationMode::NotIdentified`], then collects a sender, recipients,
/// and finally the message data. The fields are only changed by [`crate::command::Dispatcher`];
/// responders get to look at them.
#[derive(Debug)]
pub struct Session {
    id: u64,
    remote: SocketAddr,
    identification: Identification,
    mail_from: Option<MailAddress>,
    recipients: Vec<MailAddress>,
    has_data: bool,
    in_data_mode: bool,
    activity: Arc<ActivityClock>,
}

impl Session {
    /// Create a [`Self`] for a client connecting from `remote`.
    #[must_use]
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            remote,
            identification: Identification::default(),
            mail_from: None,
            recipients: Vec::new(),
            has_data: false,
            in_data_mode: false,
            activity: Arc::new(ActivityClock::new()),
        }
    }

    /// Get an identifier that no other session in this process shares.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn remote(&self) -> SocketAddr {
        self.remote
    }

    #[must_use]
    pub const fn identification(&self) -> &Identification {
        &self.identification
    }

    #[must_use]
    pub fn is_identified(&self) -> bool {
        self.identification.mode != IdentificationMode::NotIdentified
    }

    /// Get the sender from the last successful `MAIL FROM:`.
    #[must_use]
    pub const fn mail_from(&self) -> Option<&MailAddress> {
        self.mail_from.as_ref()
    }

    /// Get every accepted `RCPT TO:`, in the order they were sent.
    #[must_use]
    pub fn recipients(&self) -> &[MailAddress] {
        &self.recipients
    }

    /// Whether a `DATA` command has been accepted during this transaction.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.has_data
    }

    /// Whether lines are currently message content rather than commands.
    #[must_use]
    pub const fn in_data_mode(&self) -> bool {
        self.in_data_mode
    }

    /// Get the clock tracking this session's activity.
    #[must_use]
    pub const fn activity(&self) -> &Arc<ActivityClock> {
        &self.activity
    }

    /// Record that the client just did something.
    pub fn touch(&self) {
        self.activity.touch();
    }

    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.activity.idle_time()
    }

    /// Abort the current mail transaction.
    ///
    /// Clears the sender, recipients, and data. Leaves the identification and the activity clock
    /// alone.
    pub fn reset(&mut self) {
        self.mail_from = None;
        self.recipients.clear();
        self.has_data = false;
        self.in_data_mode = false;
    }

    pub(crate) fn set_identification(&mut self, identification: Identification) {
        self.identification = identification;
    }

    pub(crate) fn set_mail_from(&mut self, address: MailAddress) {
        self.mail_from = Some(address);
    }

    pub(crate) fn add_recipient(&mut self, address: MailAddress) {
        self.recipients.push(address);
    }

    pub(crate) fn start_data(&mut self) {
        self.in_data_mode = true;
        self.has_data = true;
    }

    pub(crate) fn end_data(&mut self) {
        self.in_data_mode = false;
    }
}
