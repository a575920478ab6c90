//! Line decoder for `feed=continuous` responses.
//!
//! A continuous feed sends one JSON object per line, blank lines as
//! heartbeats, and when the server's own timeout fires a final
//! `{"last_seq": ...}` object before closing.

use crate::error::{CouchError, Result};
use crate::protocol::constants::MAX_FEED_LINE_BYTES;
use crate::types::{Change, Seq};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// One meaningful line of a continuous feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedLine {
    /// A document changed.
    Change(Change),
    /// The server ended the feed at this sequence.
    End {
        /// Where to resume.
        last_seq: Seq,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLine {
    Change(Change),
    End { last_seq: Seq },
}

/// Reads [`FeedLine`]s from a feed body, skipping heartbeats.
///
/// Lines longer than the limit (16 MiB unless set with
/// [`with_max_line`](Self::with_max_line)) fail the read instead of growing
/// the buffer without bound.
pub struct ChangeLines<R> {
    reader: BufReader<R>,
    // Partial line kept across cancelled reads.
    line: Vec<u8>,
    max_line: usize,
}

impl<R: AsyncRead + Unpin> ChangeLines<R> {
    /// Decode lines from `reader`, typically `&mut ChangeReader`.
    pub fn new(reader: R) -> Self {
        ChangeLines {
            reader: BufReader::new(reader),
            line: Vec::new(),
            max_line: MAX_FEED_LINE_BYTES,
        }
    }

    /// Limit a single line, newline included, to `bytes`.
    pub fn with_max_line(mut self, bytes: usize) -> Self {
        self.max_line = bytes;
        self
    }

    /// Buffer the next line. Returns `false` at end of body with nothing
    /// buffered.
    async fn read_line(&mut self) -> Result<bool> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(!self.line.is_empty());
            }
            let (used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            };
            if self.line.len() + used > self.max_line {
                return Err(CouchError::Protocol(format!(
                    "feed line longer than {} bytes",
                    self.max_line
                )));
            }
            self.line.extend_from_slice(&available[..used]);
            self.reader.consume(used);
            if complete {
                return Ok(true);
            }
        }
    }

    /// Next change or end marker; `None` once the body is exhausted.
    ///
    /// # Errors
    ///
    /// Read errors (including deadline expiry) and lines that are neither a
    /// change nor an end marker.
    pub async fn next_line(&mut self) -> Result<Option<FeedLine>> {
        while self.read_line().await? {
            let line = std::mem::take(&mut self.line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let decoded = match serde_json::from_slice(&line)? {
                RawLine::Change(change) => FeedLine::Change(change),
                RawLine::End { last_seq } => FeedLine::End { last_seq },
            };
            return Ok(Some(decoded));
        }
        Ok(None)
    }

    /// Turn the decoder into a stream of lines.
    pub fn into_stream(self) -> impl Stream<Item = Result<FeedLine>> {
        stream::try_unfold(self, |mut lines| async move {
            Ok(lines.next_line().await?.map(|line| (line, lines)))
        })
    }
}
