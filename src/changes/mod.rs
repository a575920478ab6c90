//! CouchDB changes feed consumer.
//!
//! The feed loop ([`Database::changes`](crate::Database::changes)) opens one
//! connection per iteration, hands the body to a [`ChangeHandler`] and
//! reconnects wherever the handler's returned [`Cursor`] says. Connection
//! failures are retried forever after a fixed delay; a silent connection is
//! detected by a per-read deadline on the dialed socket.
//!
//! # Module Organization
//!
//! ```text
//! changes/
//! ├── dial       - Dialer hook and socket types
//! ├── deadline   - Read deadlines on a dialed socket
//! ├── wire       - GET request encoding and response framing
//! ├── reader     - ChangeReader, the deadline-enforcing body reader
//! ├── handler    - Cursor and the ChangeHandler contract
//! ├── feed       - The reconnecting feed loop
//! ├── batch      - One-shot decoding of a complete response
//! ├── continuous - Line decoder for feed=continuous
//! └── follow     - Closure-per-change handler
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChangeHandler`] | Consumes one connection, returns the next [`Cursor`] |
//! | [`ChangeReader`] | Response body with a per-read timeout |
//! | [`Dialer`] | Opens feed sockets; swap it to route or mock connections |
//! | [`ChangeCallback`] | Handler calling a closure for every change |
//! | [`CatchUp`] | Handler for a single batch read |
//! | [`ChangeLines`] | Continuous-feed line decoder |

mod batch;
mod continuous;
mod deadline;
mod dial;
mod feed;
mod follow;
mod handler;
mod reader;
mod wire;

pub use batch::{read_all_changes, CatchUp};
pub use continuous::{ChangeLines, FeedLine};
pub use deadline::{DeadlineHandle, DeadlineSocket};
pub use dial::{BoxedSocket, DialFn, Dialer, Socket, TcpDialer};
pub use feed::feed_timeout;
pub use follow::ChangeCallback;
pub use handler::{ChangeHandler, Cursor};
pub use reader::ChangeReader;
pub use wire::{ResponseBody, ResponseHead};
