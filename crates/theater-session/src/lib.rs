//! Connection sessions for Theater.
//!
//! A session is the core's record of one control connection, from
//! accept to close:
//!
//! 1. **Role**: client or game server. Every connection starts as a
//!    client; creating or updating a game marks it as a server.
//! 2. **Liveness**: `active` drops to `false` the moment the connection
//!    starts closing, and stays there. Handlers skip inactive sessions.
//! 3. **Identity**: resolved once from the durable store.
//! 4. **Timers**: heartbeat and join poll ([`SessionTimers`]), owned by
//!    the connection task and stopped when the session ends.
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby Layer (above)    ← uses session ids and roles for ownership
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol / Transport (below) ← Identity, ConnectionId
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Role, Session, SessionConfig, SessionTimers};
