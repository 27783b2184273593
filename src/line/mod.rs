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

//! Splits a stream of bytes into lines.
//!
//! See [`LineFramer`].

use std::io::{self, Read};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{str::max_lengths, Error};


/// The backspace character, see [`strip_escapes`].
pub const ESCAPE: u8 = 0x08;

/// The most bytes of one line that [`LineFramer`] keeps.
pub const MAX_LINE: usize = max_lengths::LINE + 1;

/// Reads one line at a time out of a byte stream.
///
/// [RFC 5321 section 2.3.8](https://www.rfc-editor.org/rfc/rfc5321.html#section-2.3.8) only
/// allows `CRLF`, but real clients also send bare `CR` or bare `LF`. Each of `"\r"`, `"\n"`, and
/// `"\r\n"` counts as exactly one line break, including when a `"\r\n"` is split across two
/// reads.
///
/// Lines are returned without their line ending. Bytes are never interpreted, so lines may contain
/// anything other than `'\r'` and `'\n'`.
///
/// Lines longer than [`MAX_LINE`] are cut off at [`MAX_LINE`] bytes and the rest of the line is
/// discarded as it arrives, so they still read as too long for [`max_lengths::LINE`] without ever
/// being held whole.
#[derive(Debug)]
pub struct LineFramer<R> {
    reader: R,
    /// Bytes read from [`Self::reader`] that have not been scanned yet live in `start..end`.
    buffer: Box<[u8]>,
    start: usize,
    end: usize,
    /// The bytes of a line that has not found its line ending yet.
    pending: Vec<u8>,
    /// The last line ended with a `'\r'` at the very end of the buffer, so a `'\n'` at the start
    /// of the next read belongs to that line ending.
    skip_lf: bool,
    eof: bool,
}

impl<R> LineFramer<R> {
    /// Create a [`Self`] that reads into a buffer of `buffer_size` bytes.
    ///
    /// # Errors
    ///
    /// [`Error::ZeroBufferSize`] if `buffer_size` is zero.
    pub fn new(reader: R, buffer_size: usize) -> crate::Result<Self> {
        if buffer_size == 0 {
            return Err(Error::ZeroBufferSize);
        }

        Ok(Self::with_buffer(reader, buffer_size))
    }

    /// Create a [`Self`] with a buffer of [`max_lengths::READ_BUFFER`] bytes.
    pub fn with_default_buffer(reader: R) -> Self {
        Self::with_buffer(reader, max_lengths::READ_BUFFER)
    }

    fn with_buffer(reader: R, buffer_size: usize) -> Self {
        Self {
            reader,
            buffer: vec![0; buffer_size].into_boxed_slice(),
            start: 0,
            end: 0,
            pending: Vec::new(),
            skip_lf: false,
            eof: false,
        }
    }

    /// Get the size of the read buffer.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Look for a complete line in the unscanned part of the buffer.
    ///
    /// Returns `None` once the buffer is exhausted, after moving whatever was left into
    /// [`Self::pending`].
    fn scan(&mut self) -> Option<Vec<u8>> {
        if self.skip_lf && self.start < self.end {
            if self.buffer[self.start] == b'\n' {
                self.start += 1;
            }
            self.skip_lf = false;
        }

        let window = &self.buffer[self.start..self.end];

        let Some(position) = window.iter().position(|&b| b == b'\r' || b == b'\n') else {
            append_capped(&mut self.pending, window);
            self.start = self.end;

            return None;
        };

        let ending = window[position];
        append_capped(&mut self.pending, &window[..position]);
        self.start += position + 1;

        if ending == b'\r' {
            if self.start < self.end {
                if self.buffer[self.start] == b'\n' {
                    self.start += 1;
                }
            } else {
                // The matching `'\n'`, if any, has not been read yet.
                self.skip_lf = true;
            }
        }

        Some(std::mem::take(&mut self.pending))
    }

    /// Record the result of a read of `read` bytes into the buffer.
    fn filled(&mut self, read: usize) {
        if read == 0 {
            self.eof = true;
        } else {
            self.start = 0;
            self.end = read;
        }
    }

    /// What to return once the reader is exhausted.
    ///
    /// Whatever was accumulated without a line ending is the final line. After that, or if nothing
    /// was accumulated, there are no more lines.
    fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

impl<R: Read> LineFramer<R> {
    /// Read the next line, blocking as necessary.
    ///
    /// Returns `Ok(None)` at the end of the stream. This is distinct from `Ok(Some(vec![]))`, an
    /// empty line.
    ///
    /// # Errors
    ///
    /// Any errors from [`Read::read`] other than [`io::ErrorKind::Interrupted`], which is retried.
    pub fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(line) = self.scan() {
                return Ok(Some(line));
            }

            if self.eof {
                return Ok(self.finish());
            }

            match self.reader.read(&mut self.buffer) {
                Ok(read) => self.filled(read),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => (),
                Err(err) => return Err(err),
            }
        }
    }
}

impl<R: AsyncRead + Unpin> LineFramer<R> {
    /// Read the next line.
    ///
    /// Frames lines exactly like [`Self::read_line`]. Cancel safe: if the returned future is
    /// dropped before it completes, no bytes are lost, and the next call picks up where it left
    /// off.
    ///
    /// # Errors
    ///
    /// Any errors from [`AsyncReadExt::read`].
    pub async fn read_line_async(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(line) = self.scan() {
                return Ok(Some(line));
            }

            if self.eof {
                return Ok(self.finish());
            }

            let read = self.reader.read(&mut self.buffer).await?;
            self.filled(read);
        }
    }
}

/// Append as much of `bytes` to `line` as fits in [`MAX_LINE`].
fn append_capped(line: &mut Vec<u8>, bytes: &[u8]) {
    let room = MAX_LINE.saturating_sub(line.len());
    line.extend_from_slice(&bytes[..bytes.len().min(room)]);
}

/// Apply every backspace ([`ESCAPE`]) in a line, removing it along with the byte before it.
///
/// A backspace with nothing before it removes nothing. Consecutive backspaces each remove one
/// more byte, like pressing the key repeatedly in a terminal.
///
/// ```rust
/// # use smtp_embed::line::strip_escapes;
/// assert_eq!(strip_escapes(b"a\x08b".to_vec()), b"b");
/// assert_eq!(strip_escapes(b"\x08a".to_vec()), b"a");
/// assert_eq!(strip_escapes(b"a\x08\x08b".to_vec()), b"b");
/// ```
#[must_use]
pub fn strip_escapes(mut line: Vec<u8>) -> Vec<u8> {
    if !line.contains(&ESCAPE) {
        return line;
    }

    // `line[..kept]` is the surviving text so far, used as a stack.
    let mut kept: usize = 0;
    for index in 0..line.len() {
        let byte = line[index];

        if byte == ESCAPE {
            kept = kept.saturating_sub(1);
        } else {
            line[kept] = byte;
            kept += 1;
        }
    }

    line.truncate(kept);
    line
}
