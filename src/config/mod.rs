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

//! Settings that can be changed while the server is running.
//!
//! See [`Configuration`].

use std::{
    fmt::Debug,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::{str::max_lengths, timeouts};


/// A snapshot of every setting.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Settings {
    /// Sent in the `220` greeting, and advertised in the reply to `EHLO`.
    pub default_greeting: String,
    /// How long a connection may stay open in total. Zero disables the limit.
    pub global_connection_timeout: Duration,
    /// How long a connection may go without sending a line. Zero disables the limit.
    pub connection_idle_timeout: Duration,
    /// The largest message, in bytes, that the server advertises and accepts.
    pub max_message_size: usize,
    pub max_recipients: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_greeting: "localhost".to_string(),
            global_connection_timeout: timeouts::GLOBAL_CONNECTION,
            connection_idle_timeout: timeouts::CONNECTION_IDLE,
            max_message_size: max_lengths::MESSAGE,
            max_recipients: max_lengths::RECIPIENTS,
        }
    }
}

type Observer = Box<dyn Fn(&Settings) + Send + Sync>;

/// Thread-safe, observable [`Settings`].
///
/// Every change notifies the observers registered with [`Self::subscribe`], after the change has
/// been applied. Observers must not subscribe new observers themselves.
#[derive(Default)]
pub struct Configuration {
    settings: RwLock<Settings>,
    observers: RwLock<Vec<Observer>>,
}

impl Configuration {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            observers: RwLock::default(),
        }
    }

    /// Get a copy of the current settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn default_greeting(&self) -> String {
        self.read(|settings| settings.default_greeting.clone())
    }

    #[must_use]
    pub fn global_connection_timeout(&self) -> Duration {
        self.read(|settings| settings.global_connection_timeout)
    }

    #[must_use]
    pub fn connection_idle_timeout(&self) -> Duration {
        self.read(|settings| settings.connection_idle_timeout)
    }

    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.read(|settings| settings.max_message_size)
    }

    #[must_use]
    pub fn max_recipients(&self) -> usize {
        self.read(|settings| settings.max_recipients)
    }

    pub fn set_default_greeting(&self, greeting: impl Into<String>) {
        let greeting = greeting.into();
        self.update(|settings| settings.default_greeting = greeting);
    }

    pub fn set_global_connection_timeout(&self, timeout: Duration) {
        self.update(|settings| settings.global_connection_timeout = timeout);
    }

    pub fn set_connection_idle_timeout(&self, timeout: Duration) {
        self.update(|settings| settings.connection_idle_timeout = timeout);
    }

    pub fn set_max_message_size(&self, size: usize) {
        self.update(|settings| settings.max_message_size = size);
    }

    pub fn set_max_recipients(&self, recipients: usize) {
        self.update(|settings| settings.max_recipients = recipients);
    }

    /// Change any number of settings at once, notifying observers a single time.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) {
        let snapshot = {
            let mut settings = self
                .settings
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            change(&mut settings);

            settings.clone()
        };

        for observer in self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            observer(&snapshot);
        }
    }

    /// Call `observer` with the new settings after every change.
    pub fn subscribe(&self, observer: impl Fn(&Settings) + Send + Sync + 'static) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    fn read<T>(&self, get: impl FnOnce(&Settings) -> T) -> T {
        get(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("settings", &self.settings())
            .field(
                "observers",
                &self
                    .observers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish()
    }
}
