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

//! An SMTP server meant to be embedded inside of another application.
//!
//! The server takes care of the transport and of the ordering rules of an SMTP session
//! (`HELO`/`EHLO`, then `MAIL FROM:`, then `RCPT TO:`, then `DATA`), and hands every decision about
//! whether to accept a command to a set of [`responder`]s supplied by the embedding application.
//!
//! ```rust,no_run
//! # use std::{error::Error, sync::Arc};
//! # use smtp_embed::{config::Configuration, responder::{MessageCollector, Responders}, server::SmtpServer};
//! #
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn Error>> {
//! let config = Arc::new(Configuration::default());
//! let (collector, mut messages) = MessageCollector::new(Arc::clone(&config));
//!
//! let server = SmtpServer::new(config.clone(), Responders::new(config).with_data(collector));
//! server.bind("127.0.0.1:2525").await?;
//!
//! while let Some(message) = messages.recv().await {
//!     println!("{} bytes from {:?}", message.body.len(), message.mail_from);
//! }
//! #     Ok(())
//! # }
//! ```

#![warn(clippy::nursery, clippy::pedantic)]
#![cfg_attr(debug_assertions, allow(clippy::missing_errors_doc))]

pub mod command;
pub mod config;
pub mod connection;
pub mod decoder;
mod error;
pub mod line;
pub mod responder;
pub mod response;
pub mod server;
pub mod session;
pub mod str;
pub mod timeouts;
pub mod watchdog;

#[cfg(test)]
mod test;

pub use error::{AddressError, Error, Result};
pub use response::Response;
pub use server::SmtpServer;
pub use session::Session;
