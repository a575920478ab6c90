//! The change-feed loop.
//!
//! Each iteration dials a fresh connection, sends one `_changes` request and
//! hands the response body to the caller's [`ChangeHandler`]. The cursor the
//! handler returns decides whether and where the next iteration resumes.
//!
//! ```text
//!            ┌──────────── handler returns Since/Start ───────────┐
//!            ▼                                                    │
//!  ──► Connecting ── response ok ──► Streaming ── release ──► (cursor)
//!        │    ▲                                                   │
//!  dial/request error                                     handler returns Stop
//!        ▼    │                                                   ▼
//!       Backoff (sleep retry_delay, same cursor)               Stopped
//! ```

use super::deadline::DeadlineSocket;
use super::handler::{ChangeHandler, Cursor};
use super::reader::ChangeReader;
use super::wire::{encode_request, ResponseBody};
use crate::client::Database;
use crate::error::{CouchError, Result};
use crate::protocol::constants::{params, paths, FEED_TIMEOUT_FLOOR};
use crate::protocol::{encode_query, heartbeat_option, OptionValue, Options};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Read timeout of a feed connection for a heartbeat of `heartbeat` ms.
///
/// Twice the heartbeat when heartbeats are on, so one late keep-alive is
/// tolerated; otherwise one minute.
pub fn feed_timeout(heartbeat: i64) -> Duration {
    match u64::try_from(heartbeat) {
        Ok(ms) if ms > 0 => Duration::from_millis(ms.saturating_mul(2)),
        _ => FEED_TIMEOUT_FLOOR,
    }
}

/// Query string of a feed request.
///
/// Caller options come first (null entries dropped), then `since` from the
/// cursor or the options, then `heartbeat` when positive.
fn changes_query(options: &Options, cursor: &Cursor, heartbeat: i64) -> String {
    let mut pairs: Vec<(&str, String)> = options
        .iter()
        .filter(|(key, value)| {
            !value.is_null() && key.as_str() != params::SINCE && key.as_str() != params::HEARTBEAT
        })
        .map(|(key, value)| (key.as_str(), value.to_changes_param()))
        .collect();

    let since = cursor.since_param().or_else(|| {
        options
            .get(params::SINCE)
            .filter(|value| !value.is_null())
            .map(OptionValue::to_changes_param)
    });
    if let Some(since) = since {
        pairs.push((params::SINCE, since));
    }
    if heartbeat > 0 {
        pairs.push((params::HEARTBEAT, heartbeat.to_string()));
    }
    encode_query(pairs)
}

fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

impl Database {
    /// URL of the `_changes` request issued for `cursor`, without credentials.
    ///
    /// ```
    /// use couchdb_http::{changes::Cursor, protocol::options, Database};
    ///
    /// let db = Database::new("localhost", 5984, "feeds");
    /// let url = db
    ///     .changes_url(&options([("feed", "continuous")]), &Cursor::since(42))
    ///     .unwrap();
    /// assert_eq!(
    ///     url.as_str(),
    ///     "http://localhost:5984/feeds/_changes?feed=continuous&since=42&heartbeat=5000"
    /// );
    /// ```
    ///
    /// # Errors
    ///
    /// Fails when the `heartbeat` option is not an integer or the URL cannot
    /// be built.
    pub fn changes_url(&self, options: &Options, cursor: &Cursor) -> Result<Url> {
        let heartbeat = heartbeat_option(options, self.config.default_heartbeat_ms)?;
        self.changes_url_with(options, cursor, heartbeat)
    }

    fn changes_url_with(&self, options: &Options, cursor: &Cursor, heartbeat: i64) -> Result<Url> {
        let mut url = self.endpoint(&[paths::CHANGES])?;
        let query = changes_query(options, cursor, heartbeat);
        url.set_query(if query.is_empty() { None } else { Some(&query) });
        Ok(url)
    }

    /// Follow the database's changes feed until `handler` returns
    /// [`Cursor::Stop`].
    ///
    /// Every connection is a fresh `GET /<db>/_changes` through the
    /// configured [`Dialer`](super::Dialer). The `heartbeat` option (default
    /// [`ClientConfig::default_heartbeat_ms`](crate::ClientConfig)) sets the
    /// per-read timeout of the body handed to the handler: twice the
    /// heartbeat, or one minute when heartbeats are disabled with a value
    /// `<= 0`. Null options are not sent.
    ///
    /// Connection failures and non-success responses are logged and retried
    /// with the same cursor after [`Database::retry_delay`], without limit.
    /// Read errors are never seen by the loop, only by the handler.
    ///
    /// # Errors
    ///
    /// Only when the first request cannot be built, e.g. an ill-typed
    /// `heartbeat` option. Ending the feed is not an error.
    pub async fn changes<H>(&self, handler: &mut H, options: &Options) -> Result<()>
    where
        H: ChangeHandler + ?Sized,
    {
        let heartbeat = heartbeat_option(options, self.config.default_heartbeat_ms)?;
        let timeout = feed_timeout(heartbeat);
        let mut cursor = Cursor::Start;
        let mut first = true;

        loop {
            let url = match self.changes_url_with(options, &cursor, heartbeat) {
                Ok(url) => url,
                Err(e) if first => return Err(e),
                Err(e) => {
                    if self.config.enable_logging {
                        warn!("Unable to build change feed request: {}", e);
                    }
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };
            first = false;

            debug!("Connecting to change feed: {}", url);
            let mut reader = match self.open_feed(&url, timeout).await {
                Ok(reader) => reader,
                Err(e) => {
                    if self.config.enable_logging {
                        warn!(
                            "Error in changes feed of {}: {}, retrying in {:?}",
                            self.name, e, self.retry_delay
                        );
                    }
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            let next = handler.handle(&mut reader).await;
            release(reader).await;

            if next.is_stop() {
                debug!("Change feed of {} stopped", self.name);
                return Ok(());
            }
            cursor = next;
        }
    }

    /// Dial, send the request and read the response head.
    async fn open_feed(&self, url: &Url, timeout: Duration) -> Result<ChangeReader> {
        let address = self.address();
        let socket = self.dialer.dial("tcp", &address).await?;
        let mut socket = DeadlineSocket::new(socket);
        let deadline = socket.handle();

        let request = encode_request(
            &request_target(url),
            &address,
            self.authorization().as_deref(),
        );
        if !timeout.is_zero() {
            deadline.set_read_deadline(Some(Instant::now() + timeout));
        }
        socket.write_all(&request).await?;
        socket.flush().await?;

        let (head, body) = ResponseBody::read_head(socket).await?;
        deadline.set_read_deadline(None);
        if !head.status.is_success() {
            let mut socket = body.into_socket();
            if let Err(e) = socket.shutdown().await {
                debug!("Failed to close change feed socket: {}", e);
            }
            return Err(CouchError::Status {
                status: head.status.as_u16(),
                message: head.status_line(),
            });
        }
        Ok(ChangeReader::new(body, deadline, timeout))
    }
}

/// Close the body and the socket behind it. Failures are only logged.
async fn release(mut reader: ChangeReader) {
    reader.close();
    let mut socket = reader.into_body().into_socket();
    if let Err(e) = socket.shutdown().await {
        debug!("Failed to close change feed socket: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::options;

    #[test]
    fn test_feed_timeout() {
        assert_eq!(feed_timeout(13), Duration::from_millis(26));
        assert_eq!(feed_timeout(3999), Duration::from_millis(7998));
        assert_eq!(feed_timeout(0), Duration::from_secs(60));
        assert_eq!(feed_timeout(-3999), Duration::from_secs(60));
    }

    #[test]
    fn test_changes_query_order() {
        let opts = options([
            ("since", OptionValue::from(858245)),
            ("heartbeat", 3999.into()),
            ("feed", "continuous".into()),
            ("filter", OptionValue::Null),
        ]);
        assert_eq!(
            changes_query(&opts, &Cursor::Start, 3999),
            "feed=continuous&since=858245&heartbeat=3999"
        );
        assert_eq!(
            changes_query(&opts, &Cursor::since("9-abc"), -1),
            "feed=continuous&since=9-abc"
        );
    }

    #[test]
    fn test_changes_url_empty_query() {
        let db = Database::new("localhost", 5984, "db");
        let url = db
            .changes_url(&options([("heartbeat", 0)]), &Cursor::Start)
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:5984/db/_changes");
        assert_eq!(request_target(&url), "/db/_changes");
    }

    #[test]
    fn test_changes_url_rejects_bad_heartbeat() {
        let db = Database::new("localhost", 5984, "db");
        let err = db
            .changes_url(&options([("heartbeat", true)]), &Cursor::Start)
            .unwrap_err();
        assert!(matches!(err, CouchError::InvalidOption { .. }));
    }
}
