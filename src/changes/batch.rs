//! One-shot decoding of a complete changes response.

use super::handler::{ChangeHandler, Cursor};
use super::reader::ChangeReader;
use crate::error::Result;
use crate::types::Changes;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read `reader` to the end and decode it as a `{"results": [...], "last_seq": ...}`
/// document.
///
/// # Errors
///
/// Propagates read errors and returns [`CouchError::Json`](crate::CouchError::Json)
/// when the body is not a changes envelope.
pub async fn read_all_changes<R>(reader: &mut R) -> Result<Changes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw).await?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Handler for a single catch-up read: decodes one batch response and stops
/// the feed.
///
/// Use it with `feed=normal` (the server default) to fetch everything since a
/// sequence in one request.
///
/// ```no_run
/// use couchdb_http::{changes::CatchUp, protocol::options, Database};
///
/// # async fn run() -> couchdb_http::Result<()> {
/// let db = Database::new("localhost", 5984, "feeds");
/// let mut catch_up = CatchUp::default();
/// db.changes(&mut catch_up, &options([("since", 10)])).await?;
/// if let Some(Ok(changes)) = catch_up.into_result() {
///     println!("{} changes up to {}", changes.results.len(), changes.last_sequence);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CatchUp {
    result: Option<Result<Changes>>,
}

impl CatchUp {
    /// Outcome of the read, or `None` if the handler never ran.
    pub fn into_result(self) -> Option<Result<Changes>> {
        self.result
    }
}

#[async_trait]
impl ChangeHandler for CatchUp {
    async fn handle(&mut self, reader: &mut ChangeReader) -> Cursor {
        self.result = Some(read_all_changes(reader).await);
        Cursor::Stop
    }
}
