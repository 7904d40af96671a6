//! Session types: the record of one control connection.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use theater_protocol::{AccountId, Identity};
use theater_timer::{PeriodicTimer, TimerConfig};
use theater_transport::ConnectionId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing knobs for every session.
///
/// Intervals are kept as integers so the struct maps cleanly onto JSON
/// or TOML; use the accessor methods to get [`Duration`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds between `PING`s on the control connection. 0 disables.
    pub heartbeat_interval_secs: u64,

    /// Milliseconds between join-poll ticks. 0 disables.
    pub join_poll_interval_ms: u64,

    /// Advertised to clients in the `CONN` reply (`activityTimeoutSecs`).
    pub activity_timeout_secs: u64,

    /// Random delay, in milliseconds, added before the first tick of
    /// each timer.
    pub timer_jitter_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            join_poll_interval_ms: 1000,
            activity_timeout_secs: 30,
            timer_jitter_ms: 0,
        }
    }
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn join_poll_interval(&self) -> Duration {
        Duration::from_millis(self.join_poll_interval_ms)
    }

    /// Builder: heartbeat period in seconds.
    pub fn with_heartbeat_secs(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    /// Builder: join-poll period in milliseconds.
    pub fn with_join_poll_ms(mut self, ms: u64) -> Self {
        self.join_poll_interval_ms = ms;
        self
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// What kind of peer sits on the other end of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    /// A game client. Every connection starts here.
    #[default]
    Client,
    /// A game server that registered (or updated) a lobby.
    Server,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connection's session.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: ConnectionId,

    /// Address observed by the socket. Lobby public IPs come from here,
    /// never from what the peer claims.
    pub peer_addr: SocketAddr,

    pub role: Role,

    /// `false` once the connection has started closing. Never flips back.
    pub active: bool,

    /// Resolved identity; `None` until the peer logs in or joins.
    pub identity: Option<Identity>,

    pub connected_at: Instant,
}

impl Session {
    pub fn new(conn_id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            conn_id,
            peer_addr,
            role: Role::Client,
            active: true,
            identity: None,
            connected_at: Instant::now(),
        }
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.identity.as_ref().map(|i| i.account_id)
    }
}

// ---------------------------------------------------------------------------
// SessionTimers
// ---------------------------------------------------------------------------

/// The two periodic timers every session runs.
///
/// Owned by the connection task, so they can only fire while that task
/// is alive. [`stop`](Self::stop) cancels both.
pub struct SessionTimers {
    pub heartbeat: PeriodicTimer,
    pub join_poll: PeriodicTimer,
}

impl SessionTimers {
    /// Starts both timers from `config`.
    pub fn start(config: &SessionConfig) -> Self {
        let jitter = Duration::from_millis(config.timer_jitter_ms);
        Self {
            heartbeat: PeriodicTimer::new(
                TimerConfig::every("heartbeat", config.heartbeat_interval()).with_jitter(jitter),
            ),
            join_poll: PeriodicTimer::new(
                TimerConfig::every("join-poll", config.join_poll_interval()).with_jitter(jitter),
            ),
        }
    }

    /// Cancels both timers. Idempotent.
    pub fn stop(&mut self) {
        self.heartbeat.stop();
        self.join_poll.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.heartbeat.is_stopped() && self.join_poll.is_stopped()
    }
}
