//! Minimal HTTP/1.1 exchange over a dialed feed socket.
//!
//! The feed cannot go through a pooled client: it must keep the socket it
//! dialed so reads can carry deadlines. This module writes the `GET` and
//! decodes the response incrementally.
//!
//! # Parsing Flow
//!
//! 1. **Head**: accumulate bytes until a blank line (`\r\n\r\n`, or a bare
//!    `\n\n` from lenient servers), then parse the status line and headers
//! 2. **Framing**: pick `chunked`, `Content-Length` or read-until-close
//! 3. **Body**: decode on demand as the caller reads; bytes that arrived with
//!    the head are served first

use super::deadline::DeadlineSocket;
use crate::error::{CouchError, Result};
use crate::protocol::constants::{headers, MAX_HEAD_BYTES};
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

const MAX_CHUNK_LINE: usize = 4096;

/// Encode a `GET` request for `target` (path and query).
pub(crate) fn encode_request(target: &str, host: &str, authorization: Option<&str>) -> Bytes {
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: {}\r\nConnection: close\r\n",
        target,
        host,
        headers::USER_AGENT,
        headers::ACCEPT_JSON
    );
    if let Some(credentials) = authorization {
        request.push_str("Authorization: ");
        request.push_str(credentials);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    Bytes::from(request)
}

/// Status line and headers of a feed response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// Response status.
    pub status: StatusCode,
    /// Reason phrase, possibly empty.
    pub reason: String,
    /// Headers, names lowercased.
    pub headers: BTreeMap<String, String>,
}

impl ResponseHead {
    /// `"<code> <reason>"`, as used in error messages.
    pub fn status_line(&self) -> String {
        format!("{} {}", self.status.as_u16(), self.reason).trim_end().to_string()
    }

    fn framing(&self) -> Result<Framing> {
        if self.status == StatusCode::NO_CONTENT || self.status == StatusCode::NOT_MODIFIED {
            return Ok(Framing::Length(0));
        }
        if let Some(encoding) = self.headers.get("transfer-encoding") {
            if encoding.to_ascii_lowercase().contains("chunked") {
                return Ok(Framing::Chunked(ChunkState::Size));
            }
        }
        if let Some(len) = self.headers.get("content-length") {
            let len = len.trim().parse().map_err(|_| {
                CouchError::Protocol(format!("Invalid content-length: {}", len))
            })?;
            return Ok(Framing::Length(len));
        }
        Ok(Framing::UntilClose)
    }
}

/// Find the end of the response head, accepting CRLF or bare LF line endings.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.iter().enumerate().find_map(|(i, &b)| {
        if b != b'\n' {
            return None;
        }
        match (buf.get(i + 1), buf.get(i + 2)) {
            (Some(b'\n'), _) => Some(i + 2),
            (Some(b'\r'), Some(b'\n')) => Some(i + 3),
            _ => None,
        }
    })
}

fn parse_head(raw: &[u8]) -> Result<ResponseHead> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| CouchError::Protocol("response head is not UTF-8".to_string()))?;
    let mut lines = text.lines();

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(CouchError::Protocol(format!("Invalid status line: {}", status_line)));
    }
    let code = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| CouchError::Protocol(format!("Invalid status line: {}", status_line)))?;
    let reason = parts.next().unwrap_or_default().trim().to_string();

    let mut headers = BTreeMap::new();
    for line in lines {
        if let Some(colon_pos) = line.find(':') {
            let key = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.insert(key, value);
        }
    }

    Ok(ResponseHead {
        status: code,
        reason,
        headers,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailer,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(u64),
    Chunked(ChunkState),
    UntilClose,
}

enum Decoded {
    Data,
    NeedMore,
    Eof,
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Split one line off `buf`, without its terminator.
fn take_line(buf: &mut BytesMut) -> io::Result<Option<Bytes>> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => {
            let mut line = buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            Ok(Some(line.freeze()))
        }
        None if buf.len() > MAX_CHUNK_LINE => Err(invalid_data("chunk line too long")),
        None => Ok(None),
    }
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let text = std::str::from_utf8(line).map_err(|_| invalid_data("invalid chunk size"))?;
    let size = text.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(size, 16).map_err(|_| invalid_data("invalid chunk size"))
}

fn copy_out(buf: &mut BytesMut, out: &mut ReadBuf<'_>, limit: u64) -> usize {
    let n = buf
        .len()
        .min(out.remaining())
        .min(usize::try_from(limit).unwrap_or(usize::MAX));
    out.put_slice(&buf.split_to(n));
    n
}

impl Framing {
    fn decode(&mut self, buf: &mut BytesMut, out: &mut ReadBuf<'_>) -> io::Result<Decoded> {
        match self {
            Framing::Length(0) => Ok(Decoded::Eof),
            Framing::Length(remaining) => {
                if buf.is_empty() {
                    return Ok(Decoded::NeedMore);
                }
                let n = copy_out(buf, out, *remaining);
                *remaining -= n as u64;
                Ok(Decoded::Data)
            }
            Framing::UntilClose => {
                if buf.is_empty() {
                    return Ok(Decoded::NeedMore);
                }
                copy_out(buf, out, u64::MAX);
                Ok(Decoded::Data)
            }
            Framing::Chunked(state) => loop {
                match *state {
                    ChunkState::Size => {
                        let Some(line) = take_line(buf)? else {
                            return Ok(Decoded::NeedMore);
                        };
                        let size = parse_chunk_size(&line)?;
                        *state = if size == 0 {
                            ChunkState::Trailer
                        } else {
                            ChunkState::Data(size)
                        };
                    }
                    ChunkState::Data(remaining) => {
                        if buf.is_empty() {
                            return Ok(Decoded::NeedMore);
                        }
                        let left = remaining - copy_out(buf, out, remaining) as u64;
                        *state = if left == 0 {
                            ChunkState::DataEnd
                        } else {
                            ChunkState::Data(left)
                        };
                        return Ok(Decoded::Data);
                    }
                    ChunkState::DataEnd => {
                        let Some(line) = take_line(buf)? else {
                            return Ok(Decoded::NeedMore);
                        };
                        if !line.is_empty() {
                            return Err(invalid_data("missing CRLF after chunk"));
                        }
                        *state = ChunkState::Size;
                    }
                    ChunkState::Trailer => {
                        let Some(line) = take_line(buf)? else {
                            return Ok(Decoded::NeedMore);
                        };
                        if line.is_empty() {
                            *state = ChunkState::Done;
                        }
                    }
                    ChunkState::Done => return Ok(Decoded::Eof),
                }
            },
        }
    }

    /// Outcome of the peer closing the connection.
    fn finish(&self) -> io::Result<()> {
        match self {
            Framing::UntilClose | Framing::Length(0) | Framing::Chunked(ChunkState::Done) => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-body",
            )),
        }
    }
}

/// Decoded body of a feed response, read straight off the dialed socket.
pub struct ResponseBody {
    socket: DeadlineSocket,
    buffer: BytesMut,
    framing: Framing,
    closed: bool,
}

impl ResponseBody {
    /// Read the response head from `socket`; the remaining bytes become the body.
    pub(crate) async fn read_head(mut socket: DeadlineSocket) -> Result<(ResponseHead, ResponseBody)> {
        let mut buffer = BytesMut::with_capacity(8192);
        loop {
            if let Some(end) = find_head_end(&buffer) {
                let raw = buffer.split_to(end);
                let head = parse_head(&raw)?;
                let framing = head.framing()?;
                let body = ResponseBody {
                    socket,
                    buffer,
                    framing,
                    closed: false,
                };
                return Ok((head, body));
            }
            if buffer.len() > MAX_HEAD_BYTES {
                return Err(CouchError::Protocol("response head too large".to_string()));
            }
            if socket.read_buf(&mut buffer).await? == 0 {
                return Err(CouchError::Protocol(
                    "connection closed before response head".to_string(),
                ));
            }
        }
    }

    /// Stop reading; later reads fail with [`io::ErrorKind::NotConnected`].
    pub fn close(&mut self) {
        self.closed = true;
        self.buffer.clear();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn into_socket(self) -> DeadlineSocket {
        self.socket
    }

    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let mut chunk = [0u8; 8192];
        let mut read_buf = ReadBuf::new(&mut chunk);
        ready!(Pin::new(&mut self.socket).poll_read(cx, &mut read_buf))?;
        let filled = read_buf.filled();
        self.buffer.extend_from_slice(filled);
        Poll::Ready(Ok(filled.len()))
    }
}

impl AsyncRead for ResponseBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "response body closed",
            )));
        }
        if out.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            match this.framing.decode(&mut this.buffer, out)? {
                Decoded::Data | Decoded::Eof => return Poll::Ready(Ok(())),
                Decoded::NeedMore => {}
            }
            if ready!(this.poll_fill(cx))? == 0 {
                return Poll::Ready(this.framing.finish());
            }
        }
    }
}
