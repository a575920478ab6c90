//! Feed cursor and the handler contract.

use super::reader::ChangeReader;
use crate::types::Seq;
use async_trait::async_trait;

/// Where the next feed connection resumes, or that the feed ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// No position of its own; the `since` option given to
    /// [`Database::changes`](crate::Database::changes) applies, if any.
    Start,
    /// Resume after this sequence.
    Since(Seq),
    /// End the feed.
    Stop,
}

impl Cursor {
    /// Resume after `seq`.
    pub fn since(seq: impl Into<Seq>) -> Self {
        Cursor::Since(seq.into())
    }

    /// Whether this cursor ends the feed.
    pub fn is_stop(&self) -> bool {
        matches!(self, Cursor::Stop)
    }

    /// The `since` value this cursor puts on a request, if it overrides one.
    pub fn since_param(&self) -> Option<String> {
        match self {
            Cursor::Since(seq) if !seq.is_origin() => Some(seq.to_param()),
            _ => None,
        }
    }
}

impl From<Seq> for Cursor {
    fn from(seq: Seq) -> Self {
        Cursor::Since(seq)
    }
}

impl From<Option<Seq>> for Cursor {
    fn from(seq: Option<Seq>) -> Self {
        seq.map_or(Cursor::Stop, Cursor::Since)
    }
}

/// Consumes one connection's worth of the changes feed.
///
/// [`handle`](Self::handle) receives the response body of a single feed
/// request. It may read one JSON object, or stream for as long as it likes,
/// and returns when it wants a fresh connection or no more changes. The
/// reader is borrowed for the call only and is closed once it returns.
///
/// Read errors, including deadline expiry on a silent connection, reach the
/// handler only. Returning the last processed sequence reconnects from
/// there; returning [`Cursor::Stop`] gives up.
///
/// The feed never calls a handler concurrently with itself.
#[async_trait]
pub trait ChangeHandler: Send {
    /// Consume `reader` and return where the next connection should resume.
    async fn handle(&mut self, reader: &mut ChangeReader) -> Cursor;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_param() {
        assert_eq!(Cursor::since(858245).since_param().as_deref(), Some("858245"));
        assert_eq!(Cursor::since("7-abc").since_param().as_deref(), Some("7-abc"));
        assert_eq!(Cursor::since(0).since_param(), None);
        assert_eq!(Cursor::Start.since_param(), None);
        assert_eq!(Cursor::Stop.since_param(), None);
    }

    #[test]
    fn test_absent_sequence_stops() {
        assert!(Cursor::from(None::<Seq>).is_stop());
        assert_eq!(Cursor::from(Some(Seq::from(3))), Cursor::since(3));
    }
}
