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

//! Parsing the arguments of `MAIL FROM:` and `RCPT TO:`.

use std::{fmt::Display, str::FromStr};

use crate::AddressError;

/// An address from a `MAIL FROM:` or `RCPT TO:` command, along with any ESMTP parameters.
///
/// Only the structure is checked: one `@` splitting a non-empty local part from a non-empty
/// domain, optionally wrapped in angle brackets. [RFC 5321 section
/// 4.1.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.2) is much stricter, and it
/// is up to responders to enforce as much of it as they like.
///
/// ```rust
/// # use smtp_embed::session::MailAddress;
/// # use std::error::Error;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let address: MailAddress = " <smith@example.com> SIZE=1024 BODY=8BITMIME".parse()?;
///
/// assert_eq!(address.address(), "smith@example.com");
/// assert_eq!(address.user(), "smith");
/// assert_eq!(address.host(), "example.com");
/// assert_eq!(address.parameters().get("size"), Some("1024"));
/// #     Ok(())
/// # }
/// ```
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct MailAddress {
    address: String,
    user: String,
    host: String,
    raw: String,
    parameters: Parameters,
}

impl MailAddress {
    /// Parse an address followed by optional whitespace-separated `NAME=VALUE` parameters.
    ///
    /// # Errors
    ///
    /// Any of [`AddressError`], see its variants.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let (path, parameters) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));

        let address = match (path.starts_with('<'), path.ends_with('>')) {
            (true, true) if path.len() >= 2 => &path[1..path.len() - 1],
            (false, false) => path,
            _ => return Err(AddressError::UnbalancedBrackets),
        };

        if address.is_empty() {
            return Err(AddressError::Empty);
        }

        if address
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(AddressError::InvalidCharacter);
        }

        let (user, host) = address.rsplit_once('@').ok_or(AddressError::MissingAt)?;
        if user.is_empty() {
            return Err(AddressError::EmptyUser);
        }
        if host.is_empty() {
            return Err(AddressError::EmptyHost);
        }

        Ok(Self {
            address: address.to_string(),
            user: user.to_string(),
            host: host.to_string(),
            raw: raw.to_string(),
            parameters: Parameters::parse(parameters),
        })
    }

    /// Get the address without angle brackets, such as `smith@example.com`.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get the local part, such as `smith` in `smith@example.com`.
    ///
    /// Note that this is the only case-sensitive part of an address.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Get the domain, such as `example.com` in `smith@example.com`.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the command argument exactly as it was received.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }
}

impl FromStr for MailAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for MailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

/// ESMTP parameters of a `MAIL FROM:` or `RCPT TO:` command, such as `SIZE=1024`.
///
/// Names are case-insensitive and unique. Insertion order is kept.
///
/// [RFC 5321 section 4.1.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.2).
#[derive(PartialEq, Eq, Debug, Clone, Default, Hash)]
pub struct Parameters {
    entries: Vec<(String, String)>,
}

impl Parameters {
    /// Parse whitespace-separated `NAME=VALUE` or `NAME` items.
    ///
    /// A value may itself contain `=`. A name without a value gets an empty value.
    fn parse(parameters: &str) -> Self {
        let mut parsed = Self::default();

        for parameter in parameters.split_whitespace() {
            let (name, value) = parameter.split_once('=').unwrap_or((parameter, ""));
            parsed.set(name, value);
        }

        parsed
    }

    /// Get the value of the parameter called `name`, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set the value of the parameter called `name`, replacing any existing value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over every `(name, value)` pair in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
