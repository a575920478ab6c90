//! Protocol constants: endpoint paths, query parameter names and defaults.

use std::time::Duration;

/// Endpoint path segments.
pub mod paths {
    /// Changes feed of a database.
    pub const CHANGES: &str = "_changes";
    /// List of all databases on the server.
    pub const ALL_DBS: &str = "_all_dbs";
    /// Bulk document modification.
    pub const BULK_DOCS: &str = "_bulk_docs";
}

/// Query parameter names with special handling.
pub mod params {
    /// Resume position of the changes feed.
    pub const SINCE: &str = "since";
    /// Keep-alive interval of the changes feed, in milliseconds.
    pub const HEARTBEAT: &str = "heartbeat";
    /// View parameters whose string values are sent unquoted.
    pub const UNQUOTED_VIEW_PARAMS: &[&str] = &["startkey_docid", "endkey_docid", "stale"];
}

/// Request header values.
pub mod headers {
    /// `User-Agent` sent on every request.
    pub const USER_AGENT: &str = concat!("couchdb_http/", env!("CARGO_PKG_VERSION"));
    /// `Accept` sent on feed requests.
    pub const ACCEPT_JSON: &str = "application/json";
}

/// Heartbeat used when the caller's options carry none, in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: i64 = 5000;

/// Read timeout of a feed connection without heartbeats.
pub const FEED_TIMEOUT_FLOOR: Duration = Duration::from_secs(60);

/// Delay between feed reconnection attempts.
pub const DEFAULT_CHANGES_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Largest response head accepted on a feed connection.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Longest line a continuous feed decoder buffers before giving up.
pub const MAX_FEED_LINE_BYTES: usize = 16 * 1024 * 1024;
