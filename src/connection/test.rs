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

//! Tests for [`super`].

use std::{
    error::Error,
    sync::atomic::{AtomicBool, Ordering},
};

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::*;
use crate::{
    config::Configuration,
    responder::{DataResponder, Responders},
    response::responses,
};

type Result = std::result::Result<(), Box<dyn Error>>;

fn remote() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_000))
}

fn dispatcher() -> Dispatcher {
    Dispatcher::new(Responders::new(Arc::new(Configuration::default())))
}

/// A connection, and the client's end of it.
fn connection() -> (Connection<DuplexStream>, DuplexStream) {
    let (client, server) = tokio::io::duplex(4_096);

    (Connection::new(server, remote()), client)
}

#[tokio::test]
async fn test_run_until_quit() -> Result {
    let (mut connection, mut client) = connection();
    client
        .write_all(b"HELO foo\r\nNOOP\r\nQUIT\r\nNOOP\r\n")
        .await?;

    assert_eq!(connection.run(&dispatcher()).await, CloseReason::Quit);
    assert!(connection.session().is_identified());

    connection.disconnect().await;
    let mut replies = String::new();
    client.read_to_string(&mut replies).await?;

    // Nothing after `QUIT` is answered.
    assert_eq!(replies, "250 OK\r\n250 OK\r\n221 Bye\r\n");

    Ok(())
}

#[tokio::test]
async fn test_closed_by_client() -> Result {
    let (mut connection, mut client) = connection();
    client.write_all(b"EHLO foo\r\nMAIL FROM:<a@b.com>\r\n").await?;
    drop(client);

    assert_eq!(connection.run(&dispatcher()).await, CloseReason::ClosedByClient);
    assert_eq!(
        connection.session().mail_from().map(ToString::to_string).as_deref(),
        Some("a@b.com")
    );

    Ok(())
}

#[tokio::test]
async fn test_disconnect_through_handle() -> Result {
    let (mut connection, mut client) = connection();
    client.write_all(b"HELO foo\r\n").await?;

    let handle = Arc::clone(connection.handle());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.disconnect();
    });

    assert_eq!(connection.run(&dispatcher()).await, CloseReason::Disconnected);
    assert!(connection.handle().is_disconnected());
    assert!(connection.session().is_identified());

    // The client sees the stream close once the owner closes it.
    connection.disconnect().await;
    let mut replies = String::new();
    client.read_to_string(&mut replies).await?;
    assert_eq!(replies, "250 OK\r\n");

    Ok(())
}

#[tokio::test]
async fn test_disconnect_while_writing() -> Result {
    let (client, server) = tokio::io::duplex(32);
    let mut connection = Connection::new(server, remote());
    let handle = Arc::clone(connection.handle());

    let task = tokio::spawn(async move {
        let close_reason = connection.run(&dispatcher()).await;
        connection.disconnect().await;
        close_reason
    });

    // The client keeps sending without ever reading a reply, until the server is stuck writing one
    // and stops reading too.
    let (_replies, mut client) = tokio::io::split(client);
    let pipelined = tokio::time::timeout(Duration::from_millis(200), async {
        for _ in 0..50 {
            client.write_all(b"NOOP\r\n").await?;
        }
        io::Result::Ok(())
    })
    .await;
    assert!(pipelined.is_err());

    assert!(handle.disconnect());
    let close_reason = tokio::time::timeout(Duration::from_secs(1), task).await??;
    assert_eq!(close_reason, CloseReason::Disconnected);

    Ok(())
}

#[tokio::test]
async fn test_write_response_until() -> Result {
    let mock = tokio_test::io::Builder::new()
        .write(b"250 OK\r\n")
        .wait(Duration::from_secs(3_600))
        .build();
    let mut writer = LineWriter::new(mock);
    let cancellation = CancellationToken::new();

    writer
        .write_response_until(&responses::ok(), &cancellation)
        .await?;

    let cancel = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });
    let error = writer
        .write_response_until(&responses::ok(), &cancellation)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), io::ErrorKind::ConnectionAborted);

    Ok(())
}

#[tokio::test]
async fn test_data_aborted() -> Result {
    struct Aborts(Arc<AtomicBool>);

    impl DataResponder for Aborts {
        fn data_start(&self, _: &Session) -> Response {
            responses::data_start()
        }

        fn data_line(&self, _: &Session, _: &[u8]) -> Response {
            Response::NONE
        }

        fn data_end(&self, _: &Session) -> Response {
            responses::ok()
        }

        fn data_aborted(&self, _: &Session) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let aborted = Arc::new(AtomicBool::new(false));
    let dispatcher = Dispatcher::new(
        Responders::new(Arc::new(Configuration::default()))
            .with_data(Aborts(Arc::clone(&aborted))),
    );

    let (mut connection, mut client) = connection();
    client
        .write_all(b"HELO foo\r\nMAIL FROM:<a@b.com>\r\nRCPT TO:<c@d.com>\r\nDATA\r\nhalf\r\n")
        .await?;
    drop(client);

    assert_eq!(connection.run(&dispatcher).await, CloseReason::ClosedByClient);
    assert!(connection.session().in_data_mode());
    assert!(aborted.load(Ordering::SeqCst));

    Ok(())
}

#[tokio::test]
async fn test_activity() -> Result {
    let (mut connection, mut client) = connection();
    client.write_all(b"\r\n").await?;
    drop(client);

    // Blank lines still count as activity.
    connection.run(&dispatcher()).await;
    assert!(connection.idle_time() < Duration::from_secs(1));
    assert_eq!(connection.handle().idle_time(), connection.idle_time());

    Ok(())
}

#[tokio::test]
async fn test_disconnect_twice() {
    let (mut connection, _client) = connection();

    assert!(!connection.is_disconnected());
    connection.disconnect().await;
    connection.disconnect().await;
    assert!(connection.is_disconnected());
    assert!(connection.handle().is_disconnected());
}

#[test]
fn test_handle() {
    let handle = ConnectionHandle::new(remote(), Arc::new(ActivityClock::new()));

    assert_eq!(handle.remote_endpoint(), remote());
    assert!(handle.connection_initiated() <= Instant::now());
    assert!(!ClientConnection::is_disconnected(&handle));

    assert!(handle.disconnect());
    assert!(!handle.disconnect());
    assert!(handle.cancellation().is_cancelled());
    assert!(ClientConnection::is_disconnected(&handle));
}

#[tokio::test]
async fn test_line_writer() -> Result {
    let mock = tokio_test::io::Builder::new()
        .write(b"250-mx.example.com\r\n")
        .write(b"250-PIPELINING\r\n")
        .write(b"250 SIZE 100\r\n")
        .write(b"354 OK\r\n")
        .build();
    let mut writer = LineWriter::new(mock);

    writer
        .write_response(
            &Response::new(250, "SIZE 100").with_continuation(["mx.example.com", "PIPELINING"]),
        )
        .await?;
    writer.write_response(&Response::NONE).await?;
    writer.write_response(&responses::data_start()).await?;

    Ok(())
}
