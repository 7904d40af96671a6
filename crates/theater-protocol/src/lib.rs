//! Protocol types for the Theater core.
//!
//! This crate defines what the rest of the workspace exchanges with the
//! transport adapter:
//!
//! - **Ids and identity** ([`LobbyId`], [`AccountId`], [`PlayerId`],
//!   [`TicketId`], [`Identity`]).
//! - **The envelope** ([`Command`], [`Fields`], [`Op`]): an operation
//!   code, a payload tag and ordered tag-value fields.
//! - **Typed requests** ([`requests`]): parsed views of the commands
//!   the core acts on.
//! - **Errors** ([`ProtocolError`]): missing or malformed fields.
//!
//! Byte-level framing is the transport's business; nothing here reads
//! or writes sockets.
//!
//! ```text
//! Transport (decoded Command) → Protocol (typed view) → Session / Lobby
//! ```

mod command;
mod error;
pub mod requests;
mod types;

pub use command::{Command, DEFAULT_PAYLOAD, Fields, ParseListError, unquote};
pub use error::ProtocolError;
pub use types::{AccountId, Identity, LobbyId, Op, PlayerId, TicketId};
