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

//! End-to-end tests over TCP.

use std::{error::Error, io, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::mpsc::UnboundedReceiver,
};

use crate::{
    config::Configuration,
    responder::{MessageCollector, ReceivedMessage, Responders},
    str::max_lengths,
    SmtpServer,
};

mod is_valid_response;

type Result = std::result::Result<(), Box<dyn Error>>;

/// Start a server on a free port that collects every message.
async fn start() -> std::result::Result<
    (SmtpServer, SocketAddr, UnboundedReceiver<ReceivedMessage>),
    Box<dyn Error>,
> {
    let config = Arc::new(Configuration::default());
    let (collector, messages) = MessageCollector::new(Arc::clone(&config));
    let server = SmtpServer::new(
        Arc::clone(&config),
        Responders::new(config).with_data(collector),
    );
    let addr = server.bind("127.0.0.1:0").await?;

    Ok((server, addr, messages))
}

/// The client side of an SMTP session.
struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let (reader, writer) = TcpStream::connect(addr).await?.into_split();

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Read one line, including its line ending. Empty at the end of the stream.
    async fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.reader.read_line(&mut line).await?;

        Ok(line)
    }

    /// Read every line of a reply, stopping after a line without a `-` after the code.
    async fn read_reply(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();

        loop {
            let line = self.read_line().await?;
            let last = line.is_empty() || line.as_bytes().get(3) != Some(&b'-');
            lines.push(line);

            if last {
                return Ok(lines);
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await
    }

    /// Send `line` and read the single-line reply.
    async fn command(&mut self, line: &str) -> io::Result<String> {
        self.write_line(line).await?;
        self.read_line().await
    }
}

// 4.5.1 Minimum Implementation:
//
// - [x] `EHLO`
// - [x] `HELO`
// - [x] `MAIL`
// - [x] `RCPT`
// - [x] `DATA`
// - [x] `RSET`
// - [x] `NOOP`
// - [x] `VRFY`
// - [x] `QUIT`
//
// <https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.1>
#[tokio::test]
async fn test_session() -> Result {
    let (server, addr, mut messages) = start().await?;
    let mut client = Client::connect(addr).await?;

    assert!(is_valid_response::server_greeting(&client.read_line().await?));

    client.write_line("EHLO client.example.com").await?;
    let ehlo = client.read_reply().await?;
    assert!(is_valid_response::ehlo(&ehlo));
    assert_eq!(
        ehlo,
        [
            "250-localhost\r\n".to_string(),
            "250-PIPELINING\r\n".to_string(),
            format!("250 SIZE {}\r\n", max_lengths::MESSAGE),
        ]
    );

    assert!(is_valid_response::ok(&client.command("MAIL FROM:<a@b.com>").await?));
    assert!(is_valid_response::ok(&client.command("RCPT TO:<c@d.com>").await?));
    assert!(is_valid_response::ok(&client.command("rcpt to: <e@f.com>").await?));
    assert!(is_valid_response::ok(&client.command("NOOP").await?));
    assert!(client.command("VRFY smith").await?.starts_with("252 "));

    assert!(is_valid_response::data(&client.command("DATA").await?));
    for line in ["Subject: hello", "", "..leading dot", "QUIT"] {
        client.write_line(line).await?;
    }
    assert!(is_valid_response::ok(&client.command(".").await?));

    let message = messages.recv().await.ok_or("no message received")?;
    assert_eq!(
        message.mail_from.as_ref().map(ToString::to_string).as_deref(),
        Some("a@b.com")
    );
    assert_eq!(
        message
            .recipients
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        ["c@d.com", "e@f.com"]
    );
    assert_eq!(
        message.body,
        b"Subject: hello\r\n\r\n.leading dot\r\nQUIT\r\n"
    );

    assert!(is_valid_response::quit(&client.command("QUIT").await?));
    assert!(client.read_line().await?.is_empty());

    server.shutdown();

    Ok(())
}

#[tokio::test]
async fn test_out_of_order() -> Result {
    let (server, addr, _messages) = start().await?;
    let mut client = Client::connect(addr).await?;
    client.read_line().await?;

    assert_eq!(
        client.command("MAIL FROM:<a@b.com>").await?,
        "502 5.5.1 Use HELO/EHLO first.\r\n"
    );
    assert!(client.command("DATA").await?.starts_with("502 "));

    assert!(is_valid_response::ok(&client.command("HELO client").await?));
    assert!(client.command("RCPT TO:<c@d.com>").await?.starts_with("502 "));
    assert!(client.command("DATA").await?.starts_with("502 "));
    assert!(client.command("MAIL FROM:<a@b.com").await?.starts_with("501 "));

    assert_eq!(
        client.command("TURN").await?,
        "502 5.5.2 Command not implemented\r\n"
    );
    assert_eq!(
        client.command(&"X".repeat(3_000)).await?,
        "500 Line Too Long\r\n"
    );

    assert!(is_valid_response::ok(&client.command("MAIL FROM:<a@b.com>").await?));
    assert!(is_valid_response::ok(&client.command("RSET").await?));
    assert!(client.command("RCPT TO:<c@d.com>").await?.starts_with("502 "));

    server.shutdown();

    Ok(())
}

#[tokio::test]
async fn test_line_endings() -> Result {
    let (server, addr, _messages) = start().await?;
    let mut client = Client::connect(addr).await?;
    client.read_line().await?;

    client.writer.write_all(b"HELO foo\nNOOP\rQUIT\r\n").await?;
    assert!(is_valid_response::ok(&client.read_line().await?));
    assert!(is_valid_response::ok(&client.read_line().await?));
    assert!(is_valid_response::quit(&client.read_line().await?));

    server.shutdown();

    Ok(())
}

#[tokio::test]
async fn test_concurrent_clients() -> Result {
    let (server, addr, _messages) = start().await?;

    let clients = (0..5).map(|i| {
        tokio::spawn(async move {
            let mut client = Client::connect(addr).await?;
            client.read_line().await?;

            let helo = client.command(&format!("HELO client{i}")).await?;
            let quit = client.command("QUIT").await?;

            io::Result::Ok(is_valid_response::ok(&helo) && is_valid_response::quit(&quit))
        })
    });

    for client in clients.collect::<Vec<_>>() {
        assert!(client.await??);
    }

    server.shutdown();

    Ok(())
}
