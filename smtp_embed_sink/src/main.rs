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

//! An SMTP server that accepts every message and writes it to a directory as an `.eml` file.

#![warn(clippy::nursery, clippy::pedantic)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use smtp_embed::{
    config::Configuration,
    responder::{MessageCollector, ReceivedMessage, Responders},
    SmtpServer,
};
use structopt::StructOpt;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "smtp_embed_sink",
    about = "Accepts every message sent to it and writes each one to a directory"
)]
struct Opt {
    /// Address to listen on (can be specified multiple times)
    #[structopt(
        short = "a",
        long = "address",
        default_value = "127.0.0.1:2525",
        number_of_values = 1
    )]
    addresses: Vec<String>,

    /// Directory to write messages into, created if missing
    #[structopt(
        short = "d",
        long = "mail-dir",
        default_value = "mail",
        parse(from_os_str)
    )]
    mail_dir: PathBuf,

    /// Name announced in the greeting and in the reply to `EHLO`
    #[structopt(long = "greeting", default_value = "localhost")]
    greeting: String,

    /// Log every line sent and received
    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if opt.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set the default subscriber")?;

    tokio::fs::create_dir_all(&opt.mail_dir)
        .await
        .with_context(|| format!("failed to create {}", opt.mail_dir.display()))?;

    let config = Arc::new(Configuration::default());
    config.set_default_greeting(opt.greeting);

    let (collector, mut messages) = MessageCollector::new(Arc::clone(&config));
    let server = SmtpServer::new(
        Arc::clone(&config),
        Responders::new(config).with_data(collector),
    );

    for address in &opt.addresses {
        server
            .bind(address.as_str())
            .await
            .with_context(|| format!("failed to listen on {address}"))?;
    }

    loop {
        tokio::select! {
            message = messages.recv() => {
                let Some(message) = message else {
                    break;
                };

                if let Err(err) = save(&opt.mail_dir, &message).await {
                    error!("Failed to save message: {err:#}");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    server.shutdown();
    Ok(())
}

/// Write `message` into `dir`, named after the time it was received and its session.
async fn save(dir: &Path, message: &ReceivedMessage) -> Result<PathBuf> {
    let received = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
    let path = dir.join(format!("{received}_{}.eml", message.session_id));

    tokio::fs::write(&path, &message.body)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(
        "Saved {} bytes from {} to {}",
        message.body.len(),
        message
            .mail_from
            .as_ref()
            .map_or_else(|| "<>".to_string(), ToString::to_string),
        path.display()
    );

    Ok(path)
}
