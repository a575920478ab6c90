//! CouchDB protocol constants and request option encoding.
//!
//! # Key Items
//!
//! | Item | Description |
//! |------|-------------|
//! | [`constants`] | Endpoint paths, parameter names, feed defaults |
//! | [`OptionValue`] | Typed option value (string, integer, boolean, doc id, raw JSON) |
//! | [`Options`] | Ordered option map passed to feeds and views |
//! | [`heartbeat_option`] | Heartbeat extraction with type checking |
//! | [`encode_query`] | Order-preserving form encoding |

pub mod constants;
mod options;

pub use options::{encode_query, heartbeat_option, options, OptionValue, Options};
