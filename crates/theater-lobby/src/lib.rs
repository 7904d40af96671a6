//! Game lobbies and the join handshake for Theater.
//!
//! Game servers register lobbies; clients ask to join them; the
//! orchestrator brokers the rendezvous between the two.
//!
//! # Key types
//!
//! - [`LobbyRegistry`]: create, update and query lobby records in the
//!   shared store, with a best-effort durable mirror
//! - [`LobbyRecord`]: typed view of one stored lobby
//! - [`JoinOrchestrator`]: the per-lobby join state machine and the
//!   notice mailboxes that drive session poll ticks
//! - [`JoinState`]: `Idle → JoinRequested → TicketIssued →
//!   AwaitingServerAck → Joined`, or `Aborted`
//! - [`LobbyConfig`], [`JoinConfig`]: advertised constants and join
//!   policy

mod config;
mod error;
mod handshake;
mod orchestrator;
pub mod record;
mod registry;

pub use config::{IdentityPolicy, JoinConfig, LobbyConfig};
pub use error::LobbyError;
pub use handshake::{JoinState, JoinTicket, LobbyHandshake, Rendezvous};
pub use orchestrator::{
    ClientEnterGame, JoinAdmission, JoinNotice, JoinOrchestrator, NoticeReceiver,
    ServerJoinRequest,
};
pub use record::{LobbyAddress, LobbyCapacity, LobbyRecord};
pub use registry::LobbyRegistry;
