//! Handler that calls a closure for every change.

use super::continuous::{ChangeLines, FeedLine};
use super::handler::{ChangeHandler, Cursor};
use super::reader::ChangeReader;
use crate::types::{Change, Seq};
use async_trait::async_trait;
use tracing::debug;

/// Follows a continuous feed, passing each change to a callback.
///
/// The callback returns `false` to stop the feed. When the connection ends,
/// times out or fails, the handler asks for a reconnect after the last
/// change it delivered, so no change is seen twice.
///
/// ```no_run
/// use couchdb_http::{changes::ChangeCallback, protocol::options, Change, Database};
///
/// # async fn run() -> couchdb_http::Result<()> {
/// let db = Database::new("localhost", 5984, "feeds");
/// let mut seen = 0;
/// let mut follow = ChangeCallback::new(|change: &Change| {
///     println!("{} changed", change.id);
///     seen += 1;
///     seen < 100
/// });
/// db.changes(&mut follow, &options([("feed", "continuous")])).await?;
/// # Ok(())
/// # }
/// ```
pub struct ChangeCallback<F> {
    callback: F,
    last: Option<Seq>,
}

impl<F> ChangeCallback<F>
where
    F: FnMut(&Change) -> bool + Send,
{
    /// Call `callback` for each change.
    pub fn new(callback: F) -> Self {
        ChangeCallback {
            callback,
            last: None,
        }
    }

    /// Resume after `seq` instead of the `since` option.
    pub fn resume_from(mut self, seq: impl Into<Seq>) -> Self {
        self.last = Some(seq.into());
        self
    }

    /// Last sequence delivered to the callback or reported by the server.
    pub fn last_seq(&self) -> Option<&Seq> {
        self.last.as_ref()
    }

    fn resume(&self) -> Cursor {
        match &self.last {
            Some(seq) => Cursor::Since(seq.clone()),
            None => Cursor::Start,
        }
    }
}

#[async_trait]
impl<F> ChangeHandler for ChangeCallback<F>
where
    F: FnMut(&Change) -> bool + Send,
{
    async fn handle(&mut self, reader: &mut ChangeReader) -> Cursor {
        let mut lines = ChangeLines::new(reader);
        loop {
            match lines.next_line().await {
                Ok(Some(FeedLine::Change(change))) => {
                    let keep_going = (self.callback)(&change);
                    self.last = Some(change.sequence);
                    if !keep_going {
                        return Cursor::Stop;
                    }
                }
                Ok(Some(FeedLine::End { last_seq })) => {
                    self.last = Some(last_seq);
                    return self.resume();
                }
                Ok(None) => return self.resume(),
                Err(e) => {
                    debug!("Change feed read ended: {}", e);
                    return self.resume();
                }
            }
        }
    }
}
