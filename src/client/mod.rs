//! CouchDB HTTP client.
//!
//! A [`Database`] describes one database on one server: where it lives, the
//! credentials to send, how to dial feed connections and how long to wait
//! between reconnects. Document, view and database requests go through a
//! pooled `reqwest` client built from its [`ClientConfig`]; the changes feed
//! dials its own sockets (see [`crate::changes`]).
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── database - Database descriptor, URLs and credentials
//! ├── fetch    - Document CRUD and database requests
//! ├── views    - View queries
//! ├── config   - Client configuration
//! └── utils    - Utility functions
//! ```
//!
//! # Examples
//!
//! ```
//! use couchdb_http::{ClientConfig, Database};
//!
//! let config = ClientConfig {
//!     max_retries: 5,
//!     changes_retry_delay_ms: 2000,
//!     ..Default::default()
//! };
//! let db = Database::new("localhost", 5984, "feeds").with_config(config);
//! assert_eq!(db.retry_delay().as_millis(), 2000);
//! ```

mod config;
mod database;
mod fetch;
mod utils;
mod views;

pub use config::ClientConfig;
pub use database::{Credentials, Database};
pub use utils::{basic_auth_header, exponential_backoff, is_retryable_status, strip_etag};
