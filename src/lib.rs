#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! ## Module Structure
//!
//! - **[changes]** - Change-feed loop, dial hook, deadline reader and handlers
//! - **[client]** - Database descriptor, document CRUD and view queries
//! - **[types]** - Wire types (Change, Changes, Seq, DbInfo, ...)
//! - **[error]** - Error types and result handling
//! - **[protocol]** - Protocol constants and option encoding

pub mod changes;
pub mod client;
pub mod error;
pub mod protocol;
pub mod types;

pub use changes::{ChangeCallback, ChangeHandler, ChangeReader, Cursor, Dialer};
pub use client::{ClientConfig, Credentials, Database};
pub use error::{CouchError, Result};
pub use protocol::{OptionValue, Options};
pub use types::{Change, ChangedRev, Changes, DbInfo, DocResponse, IdAndRev, Row, Seq};
